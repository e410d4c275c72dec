pub mod archive;
pub mod copy;
pub mod error;
pub mod header;
pub mod io_stream;
pub mod storage;

pub use archive::{create, extract, list, ArchiveOptions, Archiver, CreateSummary, ExtractSummary, PathPolicy};
pub use error::{ArchiveError, HeaderError};
pub use header::{HeaderEntry, HeaderLimits, HeaderTable};
pub use io_stream::{TarReader, TarWriter};
pub use storage::{LocalFs, Storage};
