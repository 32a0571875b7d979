use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::io::UNBOUNDED;

/// A seekable byte source with a "remaining bytes in current scope" budget.
///
/// Every read and skip is charged against the budget; the budget reaching
/// exactly zero marks scope exhaustion, going negative is an error. A budget
/// of [`UNBOUNDED`] disables the accounting (top level of a document).
///
/// Skips advance the underlying position without materializing bytes, which
/// is what makes lazy traversal of unwanted values cheap.
pub struct ByteCursor<R> {
    inner: R,
    len: u64,
    remaining: i64,
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self {
            inner,
            len,
            remaining: UNBOUNDED,
        })
    }

    /// Current absolute byte offset.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Remaining byte budget of the current scope ([`UNBOUNDED`] = none).
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn set_remaining(&mut self, remaining: i64) {
        self.remaining = remaining;
    }

    /// Charge `count` bytes against the scope budget without touching the
    /// stream. Errors if the budget would go negative.
    pub fn charge(&mut self, count: u64) -> Result<()> {
        if self.remaining != UNBOUNDED {
            self.remaining -= count as i64;
            if self.remaining < 0 {
                return Err(Error::TruncatedInput);
            }
        }
        Ok(())
    }

    /// Read exactly `count` bytes, charging the scope budget.
    pub fn read_exact(&mut self, count: usize) -> Result<Vec<u8>> {
        self.charge(count as u64)?;
        let mut buf = vec![0u8; count];
        self.inner
            .read_exact(&mut buf)
            .map_err(|_| Error::TruncatedInput)?;
        Ok(buf)
    }

    /// Read a single byte, charging the scope budget.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.charge(1)?;
        let mut buf = [0u8; 1];
        self.inner
            .read_exact(&mut buf)
            .map_err(|_| Error::TruncatedInput)?;
        Ok(buf[0])
    }

    /// Read a single byte without charging the budget; `Ok(None)` at end of
    /// stream instead of an error.
    pub fn try_read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// True once the underlying stream is exhausted.
    pub fn at_end(&mut self) -> Result<bool> {
        Ok(self.position()? >= self.len)
    }

    /// Advance `count` bytes without materializing them, charging the budget.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.charge(count)?;
        let pos = self.inner.stream_position()?;
        if pos + count > self.len {
            return Err(Error::TruncatedInput);
        }
        self.inner.seek(SeekFrom::Current(count as i64))?;
        Ok(())
    }
}
