//! IO abstractions for scoped, seekable byte reading.

mod cursor;

pub use cursor::ByteCursor;

/// Budget value meaning "no enclosing scope" (top level of a document).
pub const UNBOUNDED: i64 = -1;
