//! Streaming archive engine: writer and reader.
//!
//! # Writer
//! [`TarWriter`] is given every entry name up front.  That is enough to know
//! the exact header size, so the writer seeks past the header region and
//! streams each entry's contents into the data section as it is appended,
//! recording the byte count actually copied.  `finish()` rewinds to offset 0
//! and writes the real header over the reserved region.
//!
//! # Reader
//! [`TarReader`] decodes the header and is then positioned at the first data
//! region.  Entries are copied out strictly in header order; each copy moves
//! at most the declared size and reports how many bytes the archive actually
//! held.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::copy::{copy_n, DEFAULT_BUFFER_SIZE};
use crate::error::{wrap_io_err, ArchiveError, HeaderError};
use crate::header::{header_byte_size, validate_name, HeaderEntry, HeaderLimits, HeaderTable};

/// Largest amount [`TarWriter::append`] will pull from one source: one byte
/// more than a size field can hold, so oversized inputs are detected.
const APPEND_LIMIT: u64 = u32::MAX as u64 + 1;

/// Context of an [`ArchiveError::Io`] raised by the source passed to
/// [`TarWriter::append`].  Any other I/O context came from the archive.
pub const READ_ENTRY_CONTEXT: &str = "Reading entry data";
const WRITE_ENTRY_CONTEXT: &str = "Writing entry data";

/// Remembers whether the wrapped writer failed, so a copy error can be
/// blamed on the right side.
struct WriteSide<'a, W: ?Sized> {
    inner:  &'a mut W,
    failed: bool,
}

impl<W: Write + ?Sized> WriteSide<'_, W> {
    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = true;
            }
        }
        result
    }
}

impl<W: Write + ?Sized> Write for WriteSide<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.track(result)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct TarWriter<W: Write + Seek> {
    writer:      W,
    pending:     VecDeque<String>,
    table:       HeaderTable,
    header_size: u64,
    expected:    usize,
    buf:         Vec<u8>,
}

impl<W: Write + Seek> TarWriter<W> {
    pub fn new(writer: W, names: Vec<String>) -> Result<Self, ArchiveError> {
        Self::with_options(writer, names, HeaderLimits::default(), DEFAULT_BUFFER_SIZE)
    }

    /// Validate `names`, then reserve the header region by seeking past it.
    pub fn with_options(
        mut writer:  W,
        names:       Vec<String>,
        limits:      HeaderLimits,
        buffer_size: usize,
    ) -> Result<Self, ArchiveError> {
        let max = limits.max_entries.min(i32::MAX as u32);
        if names.len() as u64 > u64::from(max) {
            return Err(ArchiveError::InvalidHeader(HeaderError::TooManyEntries {
                count: names.len() as u64,
                max,
            }));
        }
        for name in &names {
            validate_name(name, &limits).map_err(ArchiveError::InvalidHeader)?;
        }

        let header_size = header_byte_size(&names);
        writer.seek(SeekFrom::Start(header_size))
            .map_err(wrap_io_err!("Reserving header region"))?;
        tracing::debug!(entries = names.len(), header_size, "reserved header region");

        let expected = names.len();
        Ok(Self {
            writer,
            pending: names.into(),
            table: HeaderTable::new(),
            header_size,
            expected,
            buf: vec![0u8; buffer_size.max(1)],
        })
    }

    /// Size of the reserved header region, fixed at construction.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Entries appended so far.
    pub fn table(&self) -> &HeaderTable {
        &self.table
    }

    /// Name the next `append` will record, if any remain.
    pub fn next_name(&self) -> Option<&str> {
        self.pending.front().map(String::as_str)
    }

    /// Stream `source` to exhaustion as the next entry's data region and
    /// return the recorded size.
    ///
    /// A failing `source` is reported with [`READ_ENTRY_CONTEXT`].
    pub fn append<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<u32, ArchiveError> {
        let name = self.pending.pop_front().ok_or(ArchiveError::UnexpectedEntry)?;

        let mut dest = WriteSide { inner: &mut self.writer, failed: false };
        let copied = match copy_n(source, &mut dest, APPEND_LIMIT, &mut self.buf) {
            Ok(copied) => copied,
            Err(source) => {
                let context = if dest.failed { WRITE_ENTRY_CONTEXT } else { READ_ENTRY_CONTEXT };
                return Err(ArchiveError::Io { path: None, context, source });
            }
        };
        let size = match u32::try_from(copied) {
            Ok(size) => size,
            Err(_) => return Err(ArchiveError::EntryTooLarge { name }),
        };

        tracing::debug!(name = %name, size, "appended entry");
        self.table.push(HeaderEntry { name, size }).map_err(ArchiveError::InvalidHeader)?;
        Ok(size)
    }

    /// Rewind and write the real header over the reserved region.  Every
    /// declared entry must have been appended.
    pub fn finish(mut self) -> Result<W, ArchiveError> {
        if !self.pending.is_empty() {
            return Err(ArchiveError::MissingEntries {
                expected: self.expected,
                written:  self.table.len(),
            });
        }

        let data_end = self.writer.stream_position()
            .map_err(wrap_io_err!("Locating end of data"))?;
        self.writer.seek(SeekFrom::Start(0))
            .map_err(wrap_io_err!("Rewinding to header"))?;
        let written = self.table.encode(&mut self.writer)
            .map_err(wrap_io_err!("Writing header"))?;
        if written != self.header_size {
            return Err(ArchiveError::HeaderSizeMismatch {
                reserved: self.header_size,
                written,
            });
        }
        self.writer.seek(SeekFrom::Start(data_end))
            .map_err(wrap_io_err!("Seeking to end of data"))?;
        self.writer.flush()
            .map_err(wrap_io_err!("Flushing archive"))?;

        tracing::debug!(
            entries = self.table.len(),
            header_size = self.header_size,
            data_size = data_end - self.header_size,
            "wrote header"
        );
        Ok(self.writer)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct TarReader<R: Read> {
    reader: R,
    table:  HeaderTable,
    next:   usize,
    buf:    Vec<u8>,
}

impl<R: Read> TarReader<R> {
    pub fn new(reader: R) -> Result<Self, HeaderError> {
        Self::with_options(reader, &HeaderLimits::default(), DEFAULT_BUFFER_SIZE)
    }

    /// Decode the header; the reader is left at the first data region.
    pub fn with_options(mut reader: R, limits: &HeaderLimits, buffer_size: usize) -> Result<Self, HeaderError> {
        let table = HeaderTable::decode(&mut reader, limits)?;
        Ok(Self {
            reader,
            table,
            next: 0,
            buf: vec![0u8; buffer_size.max(1)],
        })
    }

    pub fn table(&self) -> &HeaderTable {
        &self.table
    }

    pub fn into_table(self) -> HeaderTable {
        self.table
    }

    /// Index of the entry whose data region the reader is positioned at.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Copy entry `index`'s data region into `dest`.
    ///
    /// Returns the bytes actually copied, which is less than the declared
    /// size only if the archive ends early.  Entries must be copied in
    /// header order.
    pub fn copy_entry<W: Write + ?Sized>(&mut self, index: usize, dest: &mut W) -> io::Result<u64> {
        if index != self.next {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry {index} requested but the reader is at entry {}", self.next),
            ));
        }
        let size = self.table.get(index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Entry not found"))?
            .size;

        let copied = copy_n(&mut self.reader, dest, u64::from(size), &mut self.buf)?;
        self.next += 1;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn writes_header_then_contiguous_data() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["a.txt", "b.txt"])).unwrap();
        assert_eq!(writer.header_size(), 24);
        assert_eq!(writer.append(&mut &b"hello"[..]).unwrap(), 5);
        assert_eq!(writer.append(&mut &b""[..]).unwrap(), 0);
        let bytes = writer.finish().unwrap().into_inner();

        let mut expected = 2i32.to_ne_bytes().to_vec();
        expected.extend_from_slice(b"a.txt\0");
        expected.extend_from_slice(&5u32.to_ne_bytes());
        expected.extend_from_slice(b"b.txt\0");
        expected.extend_from_slice(&0u32.to_ne_bytes());
        expected.extend_from_slice(b"hello");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn finish_leaves_writer_at_end_of_data() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["x"])).unwrap();
        writer.append(&mut &b"payload"[..]).unwrap();
        let cur = writer.finish().unwrap();
        assert_eq!(cur.position(), cur.get_ref().len() as u64);
    }

    #[test]
    fn empty_archive_is_a_zero_count() {
        let writer = TarWriter::new(Cursor::new(Vec::new()), Vec::new()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert_eq!(bytes, 0i32.to_ne_bytes());

        let reader = TarReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.table().is_empty());
    }

    #[test]
    fn rejects_bad_names_before_writing() {
        let err = TarWriter::new(Cursor::new(Vec::new()), names(&["ok", ""])).err().unwrap();
        assert!(matches!(err, ArchiveError::InvalidHeader(HeaderError::InvalidName(_))));

        let err = TarWriter::new(Cursor::new(Vec::new()), names(&["nul\0byte"])).err().unwrap();
        assert!(matches!(err, ArchiveError::InvalidHeader(HeaderError::InvalidName(_))));
    }

    #[test]
    fn enforces_entry_limit_on_write() {
        let limits = HeaderLimits { max_entries: 1, ..HeaderLimits::default() };
        let err = TarWriter::with_options(Cursor::new(Vec::new()), names(&["a", "b"]), limits, 16)
            .err()
            .unwrap();
        assert!(matches!(err, ArchiveError::InvalidHeader(HeaderError::TooManyEntries { count: 2, max: 1 })));
    }

    #[test]
    fn append_and_finish_check_declared_count() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["a", "b"])).unwrap();
        writer.append(&mut &b"1"[..]).unwrap();
        assert_eq!(writer.next_name(), Some("b"));
        let err = writer.finish().err().unwrap();
        assert!(matches!(err, ArchiveError::MissingEntries { expected: 2, written: 1 }));

        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["a"])).unwrap();
        writer.append(&mut &b"1"[..]).unwrap();
        let err = writer.append(&mut &b"2"[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::UnexpectedEntry));
    }

    #[test]
    fn reader_copies_entries_in_order() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["one", "two"])).unwrap();
        writer.append(&mut &b"first"[..]).unwrap();
        writer.append(&mut &b"second!"[..]).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = TarReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.table().len(), 2);

        let err = reader.copy_entry(1, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut first = Vec::new();
        assert_eq!(reader.copy_entry(0, &mut first).unwrap(), 5);
        let mut second = Vec::new();
        assert_eq!(reader.copy_entry(1, &mut second).unwrap(), 7);
        assert_eq!(first, b"first");
        assert_eq!(second, b"second!");
        assert_eq!(reader.next_index(), 2);
    }

    #[test]
    fn reader_reports_short_data_region() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["big"])).unwrap();
        writer.append(&mut &b"0123456789"[..]).unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();
        bytes.truncate(bytes.len() - 4);

        let mut reader = TarReader::new(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        assert_eq!(reader.copy_entry(0, &mut out).unwrap(), 6);
        assert_eq!(out, b"012345");
    }

    /// Discards writes and only tracks its position.  With `full` set every
    /// write fails.
    #[derive(Default)]
    struct PositionSink {
        pos:  u64,
        len:  u64,
        full: bool,
    }

    impl Write for PositionSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.full {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            self.pos += buf.len() as u64;
            self.len = self.len.max(self.pos);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for PositionSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.pos = match pos {
                SeekFrom::Start(n) => n,
                SeekFrom::End(n) => self.len.saturating_add_signed(n),
                SeekFrom::Current(n) => self.pos.saturating_add_signed(n),
            };
            Ok(self.pos)
        }
    }

    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    #[test]
    fn rejects_source_longer_than_size_field() {
        let limits = HeaderLimits::default();
        let mut writer =
            TarWriter::with_options(PositionSink::default(), names(&["huge"]), limits, 1 << 20).unwrap();
        let mut source = io::repeat(0).take(u32::MAX as u64 + 1);
        let err = writer.append(&mut source).unwrap_err();
        assert!(matches!(err, ArchiveError::EntryTooLarge { ref name } if name == "huge"));
    }

    #[test]
    fn largest_representable_entry_is_accepted() {
        let limits = HeaderLimits::default();
        let mut writer =
            TarWriter::with_options(PositionSink::default(), names(&["max"]), limits, 1 << 20).unwrap();
        let mut source = io::repeat(0).take(u32::MAX as u64);
        assert_eq!(writer.append(&mut source).unwrap(), u32::MAX);
    }

    #[test]
    fn append_blames_the_failing_side() {
        let mut writer = TarWriter::new(Cursor::new(Vec::new()), names(&["r"])).unwrap();
        let err = writer.append(&mut BrokenSource).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { context: READ_ENTRY_CONTEXT, path: None, .. }));

        let mut writer = TarWriter::new(PositionSink::default(), names(&["w"])).unwrap();
        writer.writer.full = true;
        let err = writer.append(&mut &b"data"[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { context: WRITE_ENTRY_CONTEXT, path: None, .. }));
    }
}
