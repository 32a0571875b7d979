//! # unkfx
//!
//! A library for recovering plaintext content from DRM-protected Kindle
//! KFX/Ion ebook containers.
//!
//! ## Features
//!
//! - Lazy, resumable binary Ion reader (symbol tables, nested containers,
//!   annotations) sufficient for the DRM container dialect
//! - Voucher decryption by bounded trial over every known key-obfuscation
//!   transform, with an optional flat-file cache of recovered keys
//! - Page decryption (AES-CBC) and legacy stream decompression
//! - Zip-archive driver that swaps decrypted members in place
//!
//! ## Quick Start
//!
//! ```no_run
//! use unkfx::{KeyList, KfxZipBook};
//!
//! let keylist = KeyList::load("keys.txt").ok();
//! let mut book = KfxZipBook::new("book.kfx-zip", keylist.as_ref(), None);
//! book.process(&["0123456789ABCDEF".to_string()])?;
//!
//! let out = std::fs::File::create("book.nodrm.kfx-zip")?;
//! book.write_to(std::io::BufWriter::new(out))?;
//! # Ok::<(), unkfx::Error>(())
//! ```
//!
//! Lower-level access is available through [`DrmVoucher`] and [`DrmIon`]
//! for callers that manage container members themselves, and through
//! [`ion::IonReader`] for raw document inspection.

pub mod archive;
pub mod drm;
pub mod error;
pub mod io;
pub mod ion;

pub use archive::KfxZipBook;
pub use drm::{DrmIon, DrmVoucher, KeyList, TransformTables};
pub use error::{Error, Result};
pub use ion::{IonReader, IonType};
