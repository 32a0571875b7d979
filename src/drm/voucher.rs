//! Voucher envelope parsing and trial decryption.
//!
//! A voucher wraps the content key in AES-256-CBC under a key derived from
//! a device/account shared secret. The exact obfuscation applied to that
//! secret varies by envelope version and cannot be predicted reliably, so
//! every known transform output is derived into a key candidate and tried
//! until the padding (and the decrypted key document) validates. Attempts
//! are pure and independent; only total exhaustion is an error.

use std::io::Cursor;

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use sha2::Sha256;

use crate::drm::keylist::KeyList;
use crate::drm::obfuscate;
use crate::drm::suite;
use crate::drm::tables::TransformTables;
use crate::drm::{BLOCK_LEN, pkcs7_unpad};
use crate::error::{Error, Result};
use crate::ion::{IonReader, IonType, protected_data_catalog};

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_TYPE_PREFIX: &str = "com.amazon.drm.VoucherEnvelope@";

/// A parsed (and optionally decrypted) DRM voucher.
pub struct DrmVoucher {
    envelope: IonReader<Cursor<Vec<u8>>>,
    voucher: Option<IonReader<Cursor<Vec<u8>>>>,

    dsn: Vec<u8>,
    secret: Vec<u8>,

    version: u32,
    voucher_id: String,
    license_type: String,
    enc_algorithm: String,
    enc_transformation: String,
    hash_algorithm: String,
    lock_params: Vec<String>,
    ciphertext: Vec<u8>,
    cipher_iv: Vec<u8>,

    shared_candidates: Vec<Vec<u8>>,
    secret_key_candidate: Option<Vec<u8>>,
    secret_key: Vec<u8>,
}

impl DrmVoucher {
    /// Wrap a voucher envelope document. `dsn` is the device serial, and
    /// `secret` the account secret; either may be empty if the voucher's
    /// strategy does not require it.
    pub fn new(envelope_data: Vec<u8>, dsn: &[u8], secret: &[u8]) -> Result<Self> {
        let mut envelope = IonReader::new(Cursor::new(envelope_data))?;
        envelope.add_catalog_item(protected_data_catalog());
        Ok(Self {
            envelope,
            voucher: None,
            dsn: dsn.to_vec(),
            secret: secret.to_vec(),
            version: 0,
            voucher_id: String::new(),
            license_type: "Unknown".to_string(),
            enc_algorithm: String::new(),
            enc_transformation: String::new(),
            hash_algorithm: String::new(),
            lock_params: Vec::new(),
            ciphertext: Vec::new(),
            cipher_iv: Vec::new(),
            shared_candidates: Vec::new(),
            secret_key_candidate: None,
            secret_key: Vec::new(),
        })
    }

    /// Walk the envelope and the embedded voucher, gathering the strategy
    /// parameters and ciphertext. Pre-recovered keys for this voucher id
    /// are picked up from `keylist`.
    pub fn parse(&mut self, keylist: Option<&KeyList>) -> Result<()> {
        self.envelope.reset()?;
        if !self.envelope.has_next()? {
            return Err(Error::MalformedDocument("voucher envelope is empty".into()));
        }
        let type_name = self.envelope.type_name().unwrap_or("").to_string();
        if self.envelope.advance()? != Some(IonType::Struct)
            || !type_name.starts_with(ENVELOPE_TYPE_PREFIX)
        {
            return Err(Error::MalformedDocument(format!(
                "expected VoucherEnvelope, got {type_name:?}"
            )));
        }
        info!("voucher envelope type {type_name}");
        self.version = type_name
            .strip_prefix(ENVELOPE_TYPE_PREFIX)
            .and_then(|v| v.strip_suffix(".0"))
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::MalformedDocument(format!("unparseable envelope version {type_name:?}"))
            })?;

        self.envelope.step_in()?;
        while self.envelope.has_next()? {
            self.envelope.advance()?;
            let field = self.envelope.field_name().map(str::to_string);
            match field.as_deref() {
                Some("voucher") => {
                    let blob = self.envelope.lob_value()?.unwrap_or_default();
                    let mut voucher = IonReader::new(Cursor::new(blob))?;
                    voucher.add_catalog_item(protected_data_catalog());
                    self.voucher = Some(voucher);
                }
                Some("strategy") => self.parse_strategy()?,
                _ => {}
            }
        }
        self.envelope.step_out()?;

        self.parse_voucher()?;

        if let Some(list) = keylist {
            self.shared_candidates = list.shared_keys(&self.voucher_id).to_vec();
            self.secret_key_candidate = list.secret_key(&self.voucher_id).map(<[u8]>::to_vec);
            debug!(
                "keylist: {} shared candidates, secret key {} for voucher {}",
                self.shared_candidates.len(),
                if self.secret_key_candidate.is_some() {
                    "present"
                } else {
                    "absent"
                },
                self.voucher_id
            );
        }
        Ok(())
    }

    fn parse_strategy(&mut self) -> Result<()> {
        if self.envelope.type_name() != Some("com.amazon.drm.PIDv3@1.0") {
            return Err(Error::MalformedDocument(format!(
                "unknown strategy: {:?}",
                self.envelope.type_name().unwrap_or("")
            )));
        }

        self.envelope.step_in()?;
        while self.envelope.has_next()? {
            self.envelope.advance()?;
            let field = self.envelope.field_name().map(str::to_string);
            match field.as_deref() {
                Some("encryption_algorithm") => {
                    self.enc_algorithm = self.envelope.string_value()?;
                }
                Some("encryption_transformation") => {
                    self.enc_transformation = self.envelope.string_value()?;
                }
                Some("hashing_algorithm") => {
                    self.hash_algorithm = self.envelope.string_value()?;
                }
                Some("lock_parameters") => {
                    self.envelope.step_in()?;
                    while self.envelope.has_next()? {
                        if self.envelope.advance()? != Some(IonType::String) {
                            return Err(Error::MalformedDocument(
                                "lock_parameters must be strings".into(),
                            ));
                        }
                        let param = self.envelope.string_value()?;
                        self.lock_params.push(param);
                    }
                    self.envelope.step_out()?;
                }
                _ => {}
            }
        }
        self.envelope.step_out()
    }

    fn parse_voucher(&mut self) -> Result<()> {
        let voucher = self
            .voucher
            .as_mut()
            .ok_or_else(|| Error::MalformedDocument("envelope carries no voucher".into()))?;

        if !voucher.has_next()? {
            return Err(Error::MalformedDocument("voucher is empty".into()));
        }
        let type_name = voucher.type_name().unwrap_or("").to_string();
        if voucher.advance()? != Some(IonType::Struct) || type_name != "com.amazon.drm.Voucher@1.0"
        {
            return Err(Error::MalformedDocument(format!(
                "expected Voucher, got {type_name:?}"
            )));
        }

        voucher.step_in()?;
        while voucher.has_next()? {
            voucher.advance()?;
            let field = voucher.field_name().map(str::to_string);
            match field.as_deref() {
                Some("cipher_iv") => {
                    self.cipher_iv = voucher.lob_value()?.unwrap_or_default();
                }
                Some("cipher_text") => {
                    self.ciphertext = voucher.lob_value()?.unwrap_or_default();
                }
                Some("id") => self.voucher_id = voucher.string_value()?,
                Some("license") => {
                    if voucher.type_name() != Some("com.amazon.drm.License@1.0") {
                        return Err(Error::MalformedDocument(format!(
                            "unknown license: {:?}",
                            voucher.type_name().unwrap_or("")
                        )));
                    }
                    voucher.step_in()?;
                    while voucher.has_next()? {
                        voucher.advance()?;
                        if voucher.field_name() == Some("license_type") {
                            self.license_type = voucher.string_value()?;
                        }
                    }
                    voucher.step_out()?;
                }
                _ => {}
            }
        }
        voucher.step_out()
    }

    /// Assemble the shared secret, derive every key candidate, and try each
    /// against the ciphertext until one validates. On success the content
    /// key is available through [`DrmVoucher::secret_key`].
    pub fn decrypt(&mut self, tables: Option<&TransformTables>) -> Result<()> {
        let mut shared = format!(
            "PIDv3{}{}{}",
            self.enc_algorithm, self.enc_transformation, self.hash_algorithm
        )
        .into_bytes();

        self.lock_params.sort();
        for param in &self.lock_params {
            match param.as_str() {
                "ACCOUNT_SECRET" => {
                    shared.extend_from_slice(param.as_bytes());
                    shared.extend_from_slice(&self.secret);
                }
                "CLIENT_ID" => {
                    shared.extend_from_slice(param.as_bytes());
                    shared.extend_from_slice(&self.dsn);
                }
                other => return Err(Error::UnsupportedLockParameter(other.to_string())),
            }
        }

        // Envelope versions are believed to map to one scramble each, but
        // that mapping has changed before; derive from all of them.
        let mut shared_secrets = vec![
            obfuscate::obfuscate(&shared, self.version),
            obfuscate::obfuscate2(&shared, self.version),
            obfuscate::obfuscate3(&shared, self.version),
        ];
        if let Some(tables) = tables {
            shared_secrets.extend(suite::transform_candidates(tables, &shared));
        } else {
            debug!("no transform tables loaded, skipping table-driven candidates");
        }

        let mut candidates = self.shared_candidates.clone();
        candidates.extend(shared_secrets.iter().map(|s| derive_key(s)));

        let mut last_error = None;
        for key in &candidates {
            match try_candidate(key, &self.cipher_iv, &self.ciphertext) {
                Ok(key_doc) => {
                    info!("voucher decryption succeeded");
                    self.secret_key = extract_secret_key(key_doc)?;
                    return Ok(());
                }
                Err(e) => {
                    debug!("decryption failed ({e}), trying next fallback");
                    last_error = Some(e);
                }
            }
        }

        if let Some(candidate) = self.secret_key_candidate.take() {
            warn!("all decryption attempts failed, falling back to keylist secret key");
            self.secret_key = candidate;
            return Ok(());
        }
        Err(Error::VoucherDecryptionFailed(Box::new(
            last_error.unwrap_or(Error::BadPadding),
        )))
    }

    /// The recovered content key (empty until [`DrmVoucher::decrypt`]
    /// succeeds).
    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }

    pub fn voucher_id(&self) -> &str {
        &self.voucher_id
    }

    pub fn license_type(&self) -> &str {
        &self.license_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Text rendering of the envelope document.
    pub fn dump_envelope(&mut self) -> Result<Vec<String>> {
        self.envelope.dump()
    }

    /// Text rendering of the embedded voucher document.
    pub fn dump_voucher(&mut self) -> Result<Vec<String>> {
        self.voucher
            .as_mut()
            .ok_or_else(|| Error::MalformedDocument("envelope carries no voucher".into()))?
            .dump()
    }
}

/// `HMAC-SHA256(candidate_secret, "PIDv3")`, the AES key for one attempt.
fn derive_key(shared_secret: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(shared_secret).expect("HMAC can take key of any size");
    mac.update(b"PIDv3");
    mac.finalize().into_bytes().to_vec()
}

/// One pure decryption attempt: AES-256-CBC, PKCS#7 validation, and a check
/// that the plaintext is a key-set document.
fn try_candidate(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<IonReader<Cursor<Vec<u8>>>> {
    if key.len() < 32 || iv.len() < BLOCK_LEN {
        return Err(Error::BadPadding);
    }
    let cipher =
        Aes256CbcDec::new_from_slices(&key[..32], &iv[..BLOCK_LEN]).map_err(|_| Error::BadPadding)?;

    let mut buf = ciphertext.to_vec();
    let plain = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| Error::BadPadding)?;
    let plain = pkcs7_unpad(plain, BLOCK_LEN)?.to_vec();

    let mut reader = IonReader::new(Cursor::new(plain))?;
    reader.add_catalog_item(protected_data_catalog());
    if !reader.has_next()? {
        return Err(Error::MalformedDocument("key document is empty".into()));
    }
    let type_name = reader.type_name().unwrap_or("").to_string();
    if reader.advance()? != Some(IonType::List) || type_name != "com.amazon.drm.KeySet@1.0" {
        return Err(Error::MalformedDocument(format!(
            "expected KeySet, got {type_name:?}"
        )));
    }
    Ok(reader)
}

/// Pull the raw AES content key out of a validated key-set document.
fn extract_secret_key(mut reader: IonReader<Cursor<Vec<u8>>>) -> Result<Vec<u8>> {
    let mut secret_key = Vec::new();

    reader.step_in()?;
    while reader.has_next()? {
        reader.advance()?;
        if reader.type_name() != Some("com.amazon.drm.SecretKey@1.0") {
            continue;
        }

        reader.step_in()?;
        while reader.has_next()? {
            reader.advance()?;
            let field = reader.field_name().map(str::to_string);
            match field.as_deref() {
                Some("algorithm") => {
                    let algorithm = reader.string_value()?;
                    if algorithm != "AES" {
                        return Err(Error::UnsupportedKeyFormat(algorithm));
                    }
                }
                Some("format") => {
                    let format = reader.string_value()?;
                    if format != "RAW" {
                        return Err(Error::UnsupportedKeyFormat(format));
                    }
                }
                Some("encoded") => {
                    secret_key = reader.lob_value()?.unwrap_or_default();
                }
                _ => {}
            }
        }
        reader.step_out()?;
        break;
    }
    reader.step_out()?;

    Ok(secret_key)
}
