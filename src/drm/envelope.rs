//! Page-container (DRMION) walking and plaintext emission.
//!
//! The outer envelope is a list of metadata and page records. Pages are
//! decrypted with the content key recovered from the voucher (or a
//! pre-recovered key from the key list), optionally decompressed, and
//! appended to the output strictly in document order.

use std::io::{Read, Seek, Write};

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use log::{debug, info};

use crate::drm::keylist::KeyList;
use crate::drm::voucher::DrmVoucher;
use crate::drm::{BLOCK_LEN, pkcs7_unpad};
use crate::error::{Error, Result};
use crate::ion::{IonReader, IonType, protected_data_catalog};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const METADATA_TYPES: [&str; 2] = [
    "com.amazon.drm.EnvelopeMetadata@1.0",
    "com.amazon.drm.EnvelopeMetadata@2.0",
];
const ENCRYPTED_PAGE_TYPES: [&str; 2] = [
    "com.amazon.drm.EncryptedPage@1.0",
    "com.amazon.drm.EncryptedPage@2.0",
];
const PLAIN_TEXT_TYPES: [&str; 2] = [
    "com.amazon.drm.PlainText@1.0",
    "com.amazon.drm.PlainText@2.0",
];
const ENVELOPE_TYPES: [&str; 2] = ["com.amazon.drm.Envelope@1.0", "com.amazon.drm.Envelope@2.0"];
const COMPRESSED_TYPE: &str = "com.amazon.drm.Compressed@1.0";

/// Walker over one DRMION page-container document.
pub struct DrmIon<'a, R> {
    ion: IonReader<R>,
    voucher: Option<&'a DrmVoucher>,
    keylist: Option<&'a KeyList>,
    voucher_name: String,
    key: Vec<u8>,
}

impl<'a, R: Read + Seek> DrmIon<'a, R> {
    /// Wrap a page-container document (magic framing already stripped).
    /// `voucher` is the decrypted voucher the metadata is expected to name;
    /// `keylist` supplies pre-recovered page keys by `encryption_key` name.
    pub fn new(
        stream: R,
        voucher: Option<&'a DrmVoucher>,
        keylist: Option<&'a KeyList>,
    ) -> Result<Self> {
        let mut ion = IonReader::new(stream)?;
        ion.add_catalog_item(protected_data_catalog());
        Ok(Self {
            ion,
            voucher,
            keylist,
            voucher_name: String::new(),
            key: Vec::new(),
        })
    }

    /// Walk the envelope and append every page's plaintext to `out` in
    /// document order.
    pub fn parse<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.ion.reset()?;

        if !self.ion.has_next()? {
            return Err(Error::MalformedDocument("page container is empty".into()));
        }
        if self.ion.advance()? != Some(IonType::Symbol) || self.ion.type_name() != Some("doctype")
        {
            return Err(Error::MalformedDocument("expected doctype symbol".into()));
        }
        let type_name = |ion: &IonReader<R>| ion.type_name().unwrap_or("").to_string();
        if self.ion.advance()? != Some(IonType::List)
            || !ENVELOPE_TYPES.contains(&type_name(&self.ion).as_str())
        {
            return Err(Error::MalformedDocument(format!(
                "expected Envelope, got {:?}",
                type_name(&self.ion)
            )));
        }

        loop {
            if type_name(&self.ion) == "enddoc" {
                break;
            }

            self.ion.step_in()?;
            while self.ion.has_next()? {
                self.ion.advance()?;
                let tn = type_name(&self.ion);
                if METADATA_TYPES.contains(&tn.as_str()) {
                    self.read_metadata()?;
                } else if ENCRYPTED_PAGE_TYPES.contains(&tn.as_str()) {
                    self.read_encrypted_page(out)?;
                } else if PLAIN_TEXT_TYPES.contains(&tn.as_str()) {
                    self.read_plain_text_page(out)?;
                }
            }
            self.ion.step_out()?;

            if !self.ion.has_next()? {
                break;
            }
            self.ion.advance()?;
        }
        Ok(())
    }

    fn read_metadata(&mut self) -> Result<()> {
        self.ion.step_in()?;
        while self.ion.has_next()? {
            self.ion.advance()?;
            let field = self.ion.field_name().map(str::to_string);

            if self.key.is_empty() && field.as_deref() == Some("encryption_key") {
                let key_name = self.ion.string_value()?;
                if let Some(key) = self.keylist.and_then(|list| list.secret_key(&key_name)) {
                    info!("obtained page key from keylist entry {key_name}");
                    self.key = key.to_vec();
                }
            }

            if field.as_deref() != Some("encryption_voucher") {
                continue;
            }
            let name = self.ion.string_value()?;
            if self.voucher_name.is_empty() {
                self.voucher_name = name;
                debug!("envelope names voucher {}", self.voucher_name);
                if let Some(voucher) = self.voucher {
                    if !voucher.secret_key().is_empty() {
                        self.key = voucher.secret_key().to_vec();
                    }
                }
            } else if self.voucher_name != name {
                return Err(Error::MalformedDocument(
                    "different vouchers required for the same file".into(),
                ));
            }
        }
        self.ion.step_out()
    }

    fn read_encrypted_page<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let mut decompress = false;
        let mut cipher_text = None;
        let mut cipher_iv = None;

        self.ion.step_in()?;
        while self.ion.has_next()? {
            self.ion.advance()?;
            if self.ion.type_name() == Some(COMPRESSED_TYPE) {
                decompress = true;
            }
            match self.ion.field_name().map(str::to_string).as_deref() {
                Some("cipher_text") => cipher_text = self.ion.lob_value()?,
                Some("cipher_iv") => cipher_iv = self.ion.lob_value()?,
                _ => {}
            }
        }

        if self.key.is_empty() {
            return Err(Error::ContentKeyUnavailable);
        }
        if let (Some(ct), Some(iv)) = (cipher_text, cipher_iv) {
            self.emit_page(&ct, Some(&iv), decompress, out)?;
        }
        self.ion.step_out()
    }

    fn read_plain_text_page<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let mut decompress = false;
        let mut data = None;

        self.ion.step_in()?;
        while self.ion.has_next()? {
            self.ion.advance()?;
            if self.ion.type_name() == Some(COMPRESSED_TYPE) {
                decompress = true;
            }
            if self.ion.field_name() == Some("data") {
                data = self.ion.lob_value()?;
            }
        }

        if let Some(data) = data {
            self.emit_page(&data, None, decompress, out)?;
        }
        self.ion.step_out()
    }

    fn emit_page<W: Write>(
        &self,
        data: &[u8],
        iv: Option<&[u8]>,
        decompress: bool,
        out: &mut W,
    ) -> Result<()> {
        let decrypted;
        let msg: &[u8] = match iv {
            Some(iv) => {
                if self.key.len() < BLOCK_LEN {
                    return Err(Error::ContentKeyUnavailable);
                }
                if iv.len() < BLOCK_LEN {
                    return Err(Error::MalformedDocument("page IV too short".into()));
                }
                let cipher = Aes128CbcDec::new_from_slices(&self.key[..BLOCK_LEN], &iv[..BLOCK_LEN])
                    .map_err(|_| Error::MalformedDocument("bad page IV".into()))?;
                let mut buf = data.to_vec();
                let plain = cipher
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| Error::BadPadding)?;
                decrypted = pkcs7_unpad(plain, BLOCK_LEN)?.to_vec();
                &decrypted
            }
            None => data,
        };

        if !decompress {
            out.write_all(msg)?;
            return Ok(());
        }

        // A leading byte selects the decompression filter; only the plain
        // legacy stream is supported.
        let filter = *msg
            .first()
            .ok_or_else(|| Error::MalformedDocument("empty compressed page".into()))?;
        if filter != 0 {
            return Err(Error::UnsupportedCompressionFilter(filter));
        }
        let mut input = &msg[1..];
        lzma_rs::lzma_decompress(&mut input, out).map_err(|e| Error::Decompress(e.to_string()))?;
        Ok(())
    }

    /// Text rendering of the page-container document.
    pub fn dump(&mut self) -> Result<Vec<String>> {
        self.ion.dump()
    }
}
