//! Error types for unkfx operations.

use thiserror::Error;

/// Errors that can occur while parsing Ion documents or removing DRM.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A read or skip ran past the end of the stream, or past the end of the
    /// enclosing container's declared byte budget.
    #[error("truncated input")]
    TruncatedInput,

    /// A variable-length integer exceeded 4 continuation bytes, or a scalar
    /// integer field was longer than 4 bytes.
    #[error("integer overflow in binary stream")]
    IntegerOverflow,

    /// The stream violates the binary format in some other way.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// PKCS#7 padding did not validate (wrong key).
    #[error("incorrect padding - wrong key")]
    BadPadding,

    /// The voucher strategy declared a lock parameter this crate does not
    /// know how to satisfy.
    #[error("unknown lock parameter: {0}")]
    UnsupportedLockParameter(String),

    /// The decrypted key record declared an algorithm or encoding other than
    /// raw AES.
    #[error("unsupported key format: {0}")]
    UnsupportedKeyFormat(String),

    /// A compressed page declared a filter this crate does not implement.
    #[error("unsupported compression filter: {0}")]
    UnsupportedCompressionFilter(u8),

    /// Every key candidate failed; carries the last underlying error.
    #[error("voucher decryption failed: {0}")]
    VoucherDecryptionFailed(#[source] Box<Error>),

    /// A page declared encryption but no key could be resolved from the
    /// voucher or the key list.
    #[error("unable to obtain content key from voucher or keylist")]
    ContentKeyUnavailable,

    #[error("LZMA decompression error: {0}")]
    Decompress(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
