//! Archive header: entry count followed by one (name, size) record per file.
//!
//! ```text
//! [count: i32][name_0 \0][size_0: u32] ... [name_{n-1} \0][size_{n-1}: u32]
//! ```
//!
//! Integers are written in the host's native byte order, so archives are
//! byte-compatible only between hosts of the same endianness.  There is no
//! magic number, version tag or checksum.  The data regions follow the last
//! record immediately, in record order, without padding.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::ops::Index;

use crate::error::HeaderError;

/// Bytes taken by the leading entry count.
pub const COUNT_SIZE: u64 = 4;
/// Bytes taken by each entry's size field.
pub const SIZE_FIELD_SIZE: u64 = 4;

/// Default cap on the entry count accepted from an archive header.
pub const DEFAULT_MAX_ENTRIES: u32 = 1 << 20;
/// Default cap on a single entry name, terminator excluded.
pub const DEFAULT_MAX_NAME_LEN: usize = 4096;
/// Upper bound on table slots reserved from the (untrusted) count before
/// any record has been read.
pub const PREALLOC_ENTRIES: u32 = 1024;

/// Bounds applied to header contents on both the write and the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimits {
    pub max_entries:  u32,
    pub max_name_len: usize,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            max_entries:  DEFAULT_MAX_ENTRIES,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

/// One archived file: its stored name and the exact length of its data region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderEntry {
    pub name: String,
    pub size: u32,
}

impl HeaderEntry {
    /// Bytes this record occupies in the encoded header.
    pub fn encoded_len(&self) -> u64 {
        self.name.len() as u64 + 1 + SIZE_FIELD_SIZE
    }
}

/// Ordered header records.  Position `i` describes data region `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderTable {
    entries: Vec<HeaderEntry>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HeaderEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Sum of all data region sizes.
    pub fn total_data_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size)).sum()
    }

    /// Append a record, failing instead of aborting if the heap is exhausted.
    pub fn push(&mut self, entry: HeaderEntry) -> Result<(), HeaderError> {
        self.entries.try_reserve(1)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Write the header and return the number of bytes written.
    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<u64> {
        let count = i32::try_from(self.entries.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "entry count does not fit the header")
        })?;
        writer.write_i32::<NativeEndian>(count)?;

        let mut written = COUNT_SIZE;
        for entry in &self.entries {
            writer.write_all(entry.name.as_bytes())?;
            writer.write_u8(0)?;
            writer.write_u32::<NativeEndian>(entry.size)?;
            written += entry.encoded_len();
        }
        Ok(written)
    }

    /// Read a header, leaving `reader` at the start of the first data region.
    ///
    /// The count is checked against `limits` before any record is read, and
    /// the table grows one fallible reservation at a time, so a corrupt count
    /// cannot trigger a huge allocation.
    pub fn decode<R: Read + ?Sized>(reader: &mut R, limits: &HeaderLimits) -> Result<Self, HeaderError> {
        let count = reader.read_i32::<NativeEndian>()?;
        if count < 0 {
            return Err(HeaderError::NegativeCount(count));
        }
        let count = count as u32;
        if count > limits.max_entries {
            return Err(HeaderError::TooManyEntries {
                count: u64::from(count),
                max:   limits.max_entries,
            });
        }

        let mut table = HeaderTable::new();
        table.entries.try_reserve(count.min(PREALLOC_ENTRIES) as usize)?;
        let mut consumed = COUNT_SIZE;

        for _ in 0..count {
            let name = read_name(reader, limits.max_name_len)?;
            let size = reader.read_u32::<NativeEndian>()?;
            let entry = HeaderEntry { name, size };
            consumed += entry.encoded_len();
            table.push(entry)?;
        }

        tracing::debug!(count, bytes = consumed, "decoded header");
        Ok(table)
    }
}

impl Index<usize> for HeaderTable {
    type Output = HeaderEntry;

    fn index(&self, index: usize) -> &HeaderEntry {
        &self.entries[index]
    }
}

impl<'a> IntoIterator for &'a HeaderTable {
    type Item = &'a HeaderEntry;
    type IntoIter = std::slice::Iter<'a, HeaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for HeaderTable {
    type Item = HeaderEntry;
    type IntoIter = std::vec::IntoIter<HeaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Exact encoded size of a header holding `names`:
/// `4 + Σ(len(name) + 1) + 4 * count`.
pub fn header_byte_size<I, S>(names: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().fold(COUNT_SIZE, |acc, name| {
        acc + name.as_ref().len() as u64 + 1 + SIZE_FIELD_SIZE
    })
}

/// Reject names the header cannot represent.
pub fn validate_name(name: &str, limits: &HeaderLimits) -> Result<(), HeaderError> {
    if name.is_empty() || name.as_bytes().contains(&0) {
        return Err(HeaderError::InvalidName(name.to_owned()));
    }
    if name.len() > limits.max_name_len {
        return Err(HeaderError::NameTooLong { len: name.len(), max: limits.max_name_len });
    }
    Ok(())
}

fn read_name<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> Result<String, HeaderError> {
    let mut bytes: Vec<u8> = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        }
        if bytes.len() == max_len {
            return Err(HeaderError::NameTooLong { len: bytes.len() + 1, max: max_len });
        }
        if bytes.len() == bytes.capacity() {
            bytes.try_reserve(bytes.len().max(16))?;
        }
        bytes.push(byte);
    }

    let name = String::from_utf8(bytes)
        .map_err(|e| HeaderError::InvalidName(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    if name.is_empty() {
        return Err(HeaderError::InvalidName(name));
    }
    Ok(name)
}
