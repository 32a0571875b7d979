//! Whole-archive round trip: find the voucher, decrypt the DRMION member,
//! and re-emit the zip with other members untouched.

mod common;

use std::io::{Cursor, Read, Write};

use common::*;
use unkfx::drm::{DRMION_MAGIC, VOUCHER_MAGIC};
use unkfx::KfxZipBook;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const DSN: &[u8] = b"0123456789ABCDEF";
const CONTENT_KEY: [u8; 16] = *b"page-content-key";
const IV: [u8; 16] = [0x42; 16];
const PAGE_TEXT: &[u8] = b"the decrypted pages of the book";

/// Envelope wrapping `CONTENT_KEY` for `DSN`, version 1, CLIENT_ID only.
fn voucher_member() -> Vec<u8> {
    let shared = format!(
        "PIDv3{}{}{}CLIENT_ID{}",
        "AES",
        "AES/CBC/PKCS5Padding",
        "HmacSHA256",
        std::str::from_utf8(DSN).unwrap()
    );
    let keyset = document(&[annotated(
        &[sid("com.amazon.drm.KeySet@1.0")],
        &list(&[annotated(
            &[sid("com.amazon.drm.SecretKey@1.0")],
            &strukt(&[
                (sid("algorithm"), string("AES")),
                (sid("format"), string("RAW")),
                (sid("encoded"), blob(&CONTENT_KEY)),
            ]),
        )]),
    )]);
    let ciphertext = aes256_encrypt(&derive_key(shared.as_bytes()), &IV, &keyset);

    let voucher = document(&[annotated(
        &[sid("com.amazon.drm.Voucher@1.0")],
        &strukt(&[
            (sid("id"), string("voucher-test")),
            (sid("cipher_text"), blob(&ciphertext)),
            (sid("cipher_iv"), blob(&IV)),
            (
                sid("license"),
                annotated(
                    &[sid("com.amazon.drm.License@1.0")],
                    &strukt(&[(sid("license_type"), string("Purchase"))]),
                ),
            ),
        ]),
    )]);

    document(&[annotated(
        &[sid("com.amazon.drm.VoucherEnvelope@1.0")],
        &strukt(&[
            (sid("voucher"), blob(&voucher)),
            (
                sid("strategy"),
                annotated(
                    &[sid("com.amazon.drm.PIDv3@1.0")],
                    &strukt(&[
                        (sid("encryption_algorithm"), string("AES")),
                        (sid("encryption_transformation"), string("AES/CBC/PKCS5Padding")),
                        (sid("hashing_algorithm"), string("HmacSHA256")),
                        (sid("lock_parameters"), list(&[string("CLIENT_ID")])),
                    ]),
                ),
            ),
        ]),
    )])
}

/// DRMION member: magic, envelope with one encrypted page, reversed magic.
fn drmion_member() -> Vec<u8> {
    let mut aes_key = [0u8; 16];
    aes_key.copy_from_slice(&CONTENT_KEY);
    let ciphertext = aes128_encrypt(&aes_key, &IV, PAGE_TEXT);

    let doc = document(&[
        annotated(
            &[sid("doctype")],
            &symbol(sid("com.amazon.drm.Envelope@1.0")),
        ),
        annotated(
            &[sid("com.amazon.drm.Envelope@1.0")],
            &list(&[
                annotated(
                    &[sid("com.amazon.drm.EnvelopeMetadata@1.0")],
                    &strukt(&[(sid("encryption_voucher"), string("voucher-test"))]),
                ),
                annotated(
                    &[sid("com.amazon.drm.EncryptedPage@1.0")],
                    &strukt(&[
                        (sid("cipher_text"), blob(&ciphertext)),
                        (sid("cipher_iv"), blob(&IV)),
                    ]),
                ),
            ]),
        ),
        annotated(&[sid("enddoc")], &symbol(sid("enddoc"))),
    ]);

    let mut member = DRMION_MAGIC.to_vec();
    member.extend_from_slice(&doc);
    member.extend(DRMION_MAGIC.iter().rev());
    member
}

fn build_archive() -> tempfile::NamedTempFile {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buf);
        let options = SimpleFileOptions::default();
        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/x-kfx-ebook").unwrap();
        zip.start_file("book/voucher.voucher", options).unwrap();
        zip.write_all(&voucher_member()).unwrap();
        zip.start_file("book/pages.ion", options).unwrap();
        zip.write_all(&drmion_member()).unwrap();
        zip.finish().unwrap();
    }
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&buf.into_inner()).unwrap();
    file
}

#[test]
fn test_member_magics() {
    assert!(voucher_member().starts_with(&VOUCHER_MAGIC));
    assert!(drmion_member().starts_with(&DRMION_MAGIC));
}

#[test]
fn test_archive_round_trip() {
    let file = build_archive();
    let mut book = KfxZipBook::new(file.path(), None, None);
    book.process(&[String::from_utf8(DSN.to_vec()).unwrap()]).unwrap();

    assert_eq!(book.decrypted_names().collect::<Vec<_>>(), ["book/pages.ion"]);
    assert_eq!(book.decrypted_member("book/pages.ion"), Some(PAGE_TEXT));
    let voucher = book.voucher().expect("voucher should be recovered");
    assert_eq!(voucher.secret_key(), CONTENT_KEY);
    assert_eq!(voucher.license_type(), "Purchase");

    // Re-emit and verify substitution and passthrough.
    let mut out = Cursor::new(Vec::new());
    book.write_to(&mut out).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(out.into_inner())).unwrap();
    let mut pages = Vec::new();
    archive
        .by_name("book/pages.ion")
        .unwrap()
        .read_to_end(&mut pages)
        .unwrap();
    assert_eq!(pages, PAGE_TEXT);

    let mut mimetype = Vec::new();
    archive
        .by_name("mimetype")
        .unwrap()
        .read_to_end(&mut mimetype)
        .unwrap();
    assert_eq!(mimetype, b"application/x-kfx-ebook");

    let mut voucher_bytes = Vec::new();
    archive
        .by_name("book/voucher.voucher")
        .unwrap()
        .read_to_end(&mut voucher_bytes)
        .unwrap();
    assert_eq!(voucher_bytes, voucher_member());
}

#[test]
fn test_wrong_pid_leaves_pages_undecryptable() {
    let file = build_archive();
    let mut book = KfxZipBook::new(file.path(), None, None);
    // The voucher fails to decrypt and no keylist exists, so the page key
    // is unavailable; the failure is attributed, not silent.
    let result = book.process(&["FFFFFFFFFFFFFFFF".to_string()]);
    assert!(matches!(result, Err(unkfx::Error::ContentKeyUnavailable)));
}
