//! Zip-archive driver for KFX books.
//!
//! A protected book is a zip archive. The voucher container is whichever
//! member leads with the voucher magic and mentions the `ProtectedData`
//! catalog; page containers lead with the DRMION magic. Decrypted members
//! replace their originals on re-emission; everything else passes through
//! unchanged.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use memchr::memmem;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::drm::keylist::KeyList;
use crate::drm::tables::TransformTables;
use crate::drm::voucher::DrmVoucher;
use crate::drm::{DRMION_MAGIC, DrmIon, VOUCHER_MAGIC};
use crate::error::{Error, Result};
use crate::ion::symtab::PROTECTED_DATA;

/// Accepted `(device_id_len, account_secret_len)` splits of a personal
/// identifier. Totals are pairwise distinct.
const PID_SPLITS: [(usize, usize); 7] =
    [(0, 0), (16, 0), (16, 40), (32, 0), (32, 40), (40, 0), (40, 40)];

/// One KFX zip archive undergoing DRM removal.
pub struct KfxZipBook<'a> {
    path: PathBuf,
    keylist: Option<&'a KeyList>,
    tables: Option<&'a TransformTables>,
    voucher: Option<DrmVoucher>,
    voucher_attempted: bool,
    decrypted: HashMap<String, Vec<u8>>,
}

impl<'a> KfxZipBook<'a> {
    pub fn new<P: AsRef<Path>>(
        path: P,
        keylist: Option<&'a KeyList>,
        tables: Option<&'a TransformTables>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keylist,
            tables,
            voucher: None,
            voucher_attempted: false,
            decrypted: HashMap::new(),
        }
    }

    /// Decrypt every DRMION member, recovering the voucher first. `pids`
    /// are candidate personal identifiers; every accepted length split of
    /// each is tried.
    pub fn process(&mut self, pids: &[String]) -> Result<()> {
        let mut archive = open_archive(&self.path)?;
        let names = member_names(&archive);

        for name in &names {
            let data = read_member(&mut archive, name)?;
            if !data.starts_with(&DRMION_MAGIC) {
                continue;
            }
            if data.len() < 2 * DRMION_MAGIC.len() {
                return Err(Error::MalformedDocument(format!(
                    "DRMION member {name} is too short"
                )));
            }

            if self.voucher.is_none() && !self.voucher_attempted {
                self.decrypt_voucher(&mut archive, &names, pids)?;
            }

            info!("decrypting DRMION member {name}");
            let body = data[DRMION_MAGIC.len()..data.len() - DRMION_MAGIC.len()].to_vec();
            let mut plain = Vec::new();
            DrmIon::new(Cursor::new(body), self.voucher.as_ref(), self.keylist)?
                .parse(&mut plain)?;
            self.decrypted.insert(name.clone(), plain);
        }

        if self.decrypted.is_empty() {
            warn!("the archive does not contain an encrypted DRMION member");
        }
        Ok(())
    }

    fn decrypt_voucher<R: Read + Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        names: &[String],
        pids: &[String],
    ) -> Result<()> {
        self.voucher_attempted = true;

        let mut voucher_data = None;
        for name in names {
            let data = read_member(archive, name)?;
            if data.starts_with(&VOUCHER_MAGIC)
                && memmem::find(&data, PROTECTED_DATA.as_bytes()).is_some()
            {
                info!("decrypting DRM voucher member {name}");
                voucher_data = Some(data);
                break;
            }
        }
        let Some(data) = voucher_data else {
            // Rarely a decrypted book still carries DRMION framing; the
            // keylist may also hold the page key directly.
            warn!("no DRM voucher member found, continuing without one");
            return Ok(());
        };

        let empty = String::new();
        let mut last_attempt = None;
        for pid in std::iter::once(&empty).chain(pids.iter()) {
            for (dsn_len, secret_len) in PID_SPLITS {
                if pid.len() != dsn_len + secret_len {
                    continue;
                }
                let (dsn, secret) = pid.as_bytes().split_at(dsn_len);

                let mut voucher = DrmVoucher::new(data.clone(), dsn, secret)?;
                let attempt = voucher
                    .parse(self.keylist)
                    .and_then(|()| voucher.decrypt(self.tables));
                match attempt {
                    Ok(()) => {
                        let license = voucher.license_type();
                        if license != "Purchase" {
                            warn!(
                                "book is licensed as {license:?}; these tools are intended \
                                 for purchased books, continuing"
                            );
                        }
                        info!("DRM voucher successfully decrypted");
                        self.voucher = Some(voucher);
                        return Ok(());
                    }
                    Err(e) => {
                        debug!("voucher attempt with pid of length {} failed: {e}", pid.len());
                        last_attempt = Some(voucher);
                    }
                }
            }
        }

        warn!("failed to decrypt the voucher with any key; relying on keylist page keys");
        self.voucher = last_attempt;
        Ok(())
    }

    /// Member names whose contents were decrypted.
    pub fn decrypted_names(&self) -> impl Iterator<Item = &str> {
        self.decrypted.keys().map(String::as_str)
    }

    /// Plaintext of a decrypted member.
    pub fn decrypted_member(&self, name: &str) -> Option<&[u8]> {
        self.decrypted.get(name).map(Vec::as_slice)
    }

    /// The decrypted voucher, if one was recovered.
    pub fn voucher(&self) -> Option<&DrmVoucher> {
        self.voucher.as_ref()
    }

    /// Write the archive back out, substituting decrypted members and
    /// passing every other member through unchanged.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut archive = open_archive(&self.path)?;
        let mut out = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for name in member_names(&archive) {
            out.start_file(&*name, options)?;
            match self.decrypted.get(&name) {
                Some(plain) => out.write_all(plain)?,
                None => {
                    let mut member = archive.by_name(&name)?;
                    std::io::copy(&mut member, &mut out)?;
                }
            }
        }
        out.finish()?;
        Ok(())
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    Ok(ZipArchive::new(BufReader::new(File::open(path)?))?)
}

fn member_names<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        if let Some(name) = archive.name_for_index(i) {
            names.push(name.to_string());
        }
    }
    names
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut member = archive.by_name(name)?;
    let mut data = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut data)?;
    Ok(data)
}
