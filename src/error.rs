use std::collections::TryReserveError;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures while decoding or validating the archive header.
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Header truncated: stream ended inside the header")]
    TruncatedHeader,
    #[error("Negative entry count: {0}")]
    NegativeCount(i32),
    #[error("Entry count {count} exceeds the limit of {max}")]
    TooManyEntries { count: u64, max: u32 },
    #[error("Entry name of {len} bytes exceeds the limit of {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("Out of memory while building the header table: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for HeaderError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => HeaderError::TruncatedHeader,
            _ => HeaderError::Io(err),
        }
    }
}

/// Failures of a whole create, extract or list call.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Cannot open archive {}: {source}", path.display())]
    CannotOpenArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot open input file {}: {source}", path.display())]
    CannotOpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot create output file {}: {source}", path.display())]
    CannotCreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt header in {}: {source}", path.display())]
    CorruptHeader {
        path: PathBuf,
        #[source]
        source: HeaderError,
    },
    #[error("Cannot build header: {0}")]
    InvalidHeader(#[source] HeaderError),
    #[error("Entry {name:?} is larger than the 4-byte size field allows")]
    EntryTooLarge { name: String },
    #[error("More entries appended than were declared")]
    UnexpectedEntry,
    #[error("Only {written} of {expected} declared entries were written")]
    MissingEntries { expected: usize, written: usize },
    #[error("Header wrote {written} bytes into a {reserved}-byte reservation")]
    HeaderSizeMismatch { reserved: u64, written: u64 },
    #[error("Entry {name:?} truncated: expected {expected} bytes, archive held {actual}")]
    TruncatedData { name: String, expected: u32, actual: u64 },
    #[error("Refusing to extract {name:?}: path leaves the output directory")]
    UnsafePath { name: String },
    #[error("{context}{}: {source}", .path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Io {
        path: Option<PathBuf>,
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    /// Attach `path` to an I/O error raised below the level that knows which
    /// file was involved.  Errors that already name a path are unchanged.
    pub fn path(self, path: impl AsRef<Path>) -> Self {
        match self {
            ArchiveError::Io { path: None, context, source } => ArchiveError::Io {
                path: Some(path.as_ref().to_path_buf()),
                context,
                source,
            },
            other => other,
        }
    }
}

/// Build a closure that wraps an `io::Error` into [`ArchiveError::Io`].
macro_rules! wrap_io_err {
    ($context:expr) => {
        |source| $crate::error::ArchiveError::Io {
            path: None,
            context: $context,
            source,
        }
    };
    ($path:expr, $context:expr) => {
        |source| $crate::error::ArchiveError::Io {
            path: Some(::std::path::PathBuf::from($path)),
            context: $context,
            source,
        }
    };
}

pub(crate) use wrap_io_err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncated_header() {
        let err = HeaderError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, HeaderError::TruncatedHeader));

        let err = HeaderError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, HeaderError::Io(_)));
    }

    #[test]
    fn diagnostics_name_the_path() {
        let err = ArchiveError::CannotOpenInput {
            path: PathBuf::from("missing.txt"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn path_fills_only_missing_io_paths() {
        let err = ArchiveError::Io {
            path: None,
            context: "Seeking",
            source: io::Error::from(io::ErrorKind::Other),
        }
        .path("out.mtar");
        assert!(matches!(&err, ArchiveError::Io { path: Some(p), .. } if p == Path::new("out.mtar")));

        let err = err.path("other.mtar");
        assert!(err.to_string().starts_with("Seeking out.mtar"));
    }
}
