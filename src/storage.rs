//! File-system capability used by [`Archiver`](crate::archive::Archiver).
//!
//! The archive engine only ever sees byte streams.  Where those streams come
//! from is decided by a [`Storage`] implementation; [`LocalFs`] is the real
//! file system.  Closing a stream is dropping it.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

pub trait Storage {
    type Input:      Read;
    type Output:     Write;
    type ArchiveIn:  Read;
    type ArchiveOut: Write + Seek;

    /// Open a file whose contents will be packed.
    fn open_input(&self, path: &Path) -> io::Result<Self::Input>;

    /// Create (or truncate) a file an entry is extracted into.
    fn create_output(&self, path: &Path) -> io::Result<Self::Output>;

    /// Create (or truncate) the archive being written.
    fn create_archive(&self, path: &Path) -> io::Result<Self::ArchiveOut>;

    /// Open an existing archive for reading.
    fn open_archive(&self, path: &Path) -> io::Result<Self::ArchiveIn>;
}

/// [`Storage`] backed by `std::fs`, with buffered streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Storage for LocalFs {
    type Input      = BufReader<File>;
    type Output     = BufWriter<File>;
    type ArchiveIn  = BufReader<File>;
    type ArchiveOut = BufWriter<File>;

    fn open_input(&self, path: &Path) -> io::Result<Self::Input> {
        File::open(path).map(BufReader::new)
    }

    /// Missing parent directories are created first.
    fn create_output(&self, path: &Path) -> io::Result<Self::Output> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        File::create(path).map(BufWriter::new)
    }

    fn create_archive(&self, path: &Path) -> io::Result<Self::ArchiveOut> {
        File::create(path).map(BufWriter::new)
    }

    fn open_archive(&self, path: &Path) -> io::Result<Self::ArchiveIn> {
        File::open(path).map(BufReader::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_output_makes_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested/deeper/file.bin");
        {
            let mut out = LocalFs.create_output(&target).unwrap();
            out.write_all(b"x").unwrap();
        }
        assert_eq!(fs::read(&target).unwrap(), b"x");
    }

    #[test]
    fn open_input_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = LocalFs.open_input(&tmp.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
