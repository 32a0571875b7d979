//! Shared test helpers: a minimal binary Ion writer for building fixtures,
//! plus AES-CBC encryption for voucher and page ciphertexts.

#![allow(dead_code)]

use std::sync::OnceLock;

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use unkfx::ion::protected_data_catalog;

pub const BVM: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

pub fn varuint(value: u64) -> Vec<u8> {
    let mut groups = vec![(value & 0x7F) as u8];
    let mut v = value >> 7;
    while v != 0 {
        groups.push((v & 0x7F) as u8);
        v >>= 7;
    }
    groups.reverse();
    *groups.last_mut().unwrap() |= 0x80;
    groups
}

fn tag(type_id: u8, len: usize) -> Vec<u8> {
    // The low nibble 14 means "var length follows"; a struct with nibble 1
    // also takes an explicit length. Use the long form in both cases.
    if len < 14 && !(type_id == 0xD && len == 1) {
        vec![(type_id << 4) | len as u8]
    } else {
        let mut out = vec![(type_id << 4) | 0x0E];
        out.extend(varuint(len as u64));
        out
    }
}

pub fn string(s: &str) -> Vec<u8> {
    let mut out = tag(0x8, s.len());
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn int(value: u64) -> Vec<u8> {
    let magnitude: Vec<u8> = value
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = tag(0x2, magnitude.len());
    out.extend(magnitude);
    out
}

pub fn symbol(sid: u64) -> Vec<u8> {
    let magnitude: Vec<u8> = sid
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = tag(0x7, magnitude.len());
    out.extend(magnitude);
    out
}

pub fn blob(data: &[u8]) -> Vec<u8> {
    let mut out = tag(0xA, data.len());
    out.extend_from_slice(data);
    out
}

pub fn list(items: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = items.concat();
    let mut out = tag(0xB, body.len());
    out.extend(body);
    out
}

pub fn strukt(fields: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field_id, value) in fields {
        body.extend(varuint(*field_id));
        body.extend_from_slice(value);
    }
    let mut out = tag(0xD, body.len());
    out.extend(body);
    out
}

pub fn annotated(sids: &[u64], value: &[u8]) -> Vec<u8> {
    let annots: Vec<u8> = sids.iter().flat_map(|&s| varuint(s)).collect();
    let mut body = varuint(annots.len() as u64);
    body.extend(annots);
    body.extend_from_slice(value);
    let mut out = tag(0xE, body.len());
    out.extend(body);
    out
}

/// Symbol id a `ProtectedData` catalog name resolves to after import.
pub fn sid(name: &str) -> u64 {
    static SYMBOLS: OnceLock<Vec<String>> = OnceLock::new();
    let symbols = SYMBOLS.get_or_init(|| protected_data_catalog().symbols);
    10 + symbols
        .iter()
        .position(|s| s == name)
        .unwrap_or_else(|| panic!("{name} not in catalog")) as u64
}

/// `$ion_symbol_table::{imports: [{name: "ProtectedData", version: 1,
/// max_id: N}]}` covering the whole catalog.
pub fn protected_data_import() -> Vec<u8> {
    let max_id = protected_data_catalog().symbols.len() as u64;
    annotated(
        &[3],
        &strukt(&[(
            6,
            list(&[strukt(&[
                (4, string("ProtectedData")),
                (5, int(1)),
                (8, int(max_id)),
            ])]),
        )]),
    )
}

/// A complete document: version marker, catalog import, values.
pub fn document(values: &[Vec<u8>]) -> Vec<u8> {
    let mut out = BVM.to_vec();
    out.extend(protected_data_import());
    for value in values {
        out.extend_from_slice(value);
    }
    out
}

// --- Crypto helpers ---

pub fn pkcs7(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let pad = 16 - out.len() % 16;
    out.resize(out.len() + pad, pad as u8);
    out
}

pub fn aes256_encrypt(key: &[u8; 32], iv: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<Aes256>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&pkcs7(plain))
}

pub fn aes128_encrypt(key: &[u8; 16], iv: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&pkcs7(plain))
}

/// The voucher key-derivation step: `HMAC-SHA256(shared_secret, "PIDv3")`.
pub fn derive_key(shared_secret: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(shared_secret).unwrap();
    mac.update(b"PIDv3");
    mac.finalize().into_bytes().into()
}
