//! Bounded stream-to-stream copy.
//!
//! [`copy_n`] moves at most `max_bytes` bytes from a reader into a writer and
//! reports how many actually moved.  A source that ends early is not an
//! error here: the caller decides what a short copy means.  Bytes are moved
//! through a caller-owned scratch buffer so one allocation serves a whole
//! archive run.

use std::io::{self, Read, Write};

/// Default scratch buffer size: 64 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Pass as `max_bytes` to copy until the source is exhausted.
pub const UNBOUNDED: u64 = u64::MAX;

/// Copy up to `max_bytes` bytes from `source` into `dest` using `buf` as
/// scratch space.
///
/// Returns the number of bytes copied, which is less than `max_bytes` only
/// when `source` reached EOF first.  Both streams advance by exactly that
/// amount.
///
/// # Panics
/// Panics if `buf` is empty and `max_bytes` is non-zero.
pub fn copy_n<R, W>(source: &mut R, dest: &mut W, max_bytes: u64, buf: &mut [u8]) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    assert!(max_bytes == 0 || !buf.is_empty(), "copy_n needs a non-empty buffer");

    let mut total: u64 = 0;
    while total < max_bytes {
        let want = (max_bytes - total).min(buf.len() as u64) as usize;
        let count = match source.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dest.write_all(&buf[..count])?;
        total += count as u64;
    }
    Ok(total)
}
