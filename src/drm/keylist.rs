//! Flat-file cache of previously recovered keys.
//!
//! One voucher per line: `voucher_id$secret_key:<hex>` and/or
//! `voucher_id$shared_key:<hex>` (the latter repeatable). Consulted before
//! the brute-force transform search.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::Result;

/// Parsed key-list file.
#[derive(Default)]
pub struct KeyList {
    shared: HashMap<String, Vec<Vec<u8>>>,
    secrets: HashMap<String, Vec<u8>>,
}

impl KeyList {
    /// Parse a key-list file. Lines that don't look like entries are
    /// skipped, not errors; the file is user-maintained.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut list = Self::default();
        let text = fs::read_to_string(path)?;

        for line in text.lines() {
            let line = line.trim();
            if line.len() < 32 {
                continue;
            }
            let mut fields = line.split('$');
            let Some(voucher_id) = fields.next() else {
                continue;
            };
            for field in fields {
                let Some((kind, hex_key)) = field.split_once(':') else {
                    continue;
                };
                let key = match hex::decode(hex_key.trim()) {
                    Ok(key) => key,
                    Err(_) => {
                        warn!("keylist: undecodable {kind} entry for {voucher_id}");
                        continue;
                    }
                };
                match kind {
                    "secret_key" => {
                        list.secrets.insert(voucher_id.to_string(), key);
                    }
                    "shared_key" => {
                        list.shared.entry(voucher_id.to_string()).or_default().push(key);
                    }
                    _ => {}
                }
            }
        }

        debug!(
            "keylist: {} secret keys, {} vouchers with shared keys",
            list.secrets.len(),
            list.shared.len()
        );
        Ok(list)
    }

    /// Shared-key candidates recorded for a voucher id.
    pub fn shared_keys(&self, voucher_id: &str) -> &[Vec<u8>] {
        self.shared.get(voucher_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pre-recovered content key for a voucher (or page key) id.
    pub fn secret_key(&self, id: &str) -> Option<&[u8]> {
        self.secrets.get(id).map(Vec::as_slice)
    }
}
