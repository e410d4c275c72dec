//! High-level [`Archiver`] API, the path-level entry point.
//!
//! ```no_run
//! use mytar::archive::{Archiver, ArchiveOptions};
//!
//! // Write
//! let summary = mytar::create(&["readme.txt", "notes.txt"], "out.mtar")?;
//! assert_eq!(summary.entries, 2);
//!
//! // Read
//! let options = ArchiveOptions { output_dir: "restored".into(), ..ArchiveOptions::default() };
//! let archiver = Archiver::new(options);
//! for entry in &archiver.list("out.mtar")? {
//!     println!("{} {}", entry.name, entry.size);
//! }
//! archiver.extract("out.mtar")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::copy::DEFAULT_BUFFER_SIZE;
use crate::error::{wrap_io_err, ArchiveError, HeaderError};
use crate::header::{HeaderEntry, HeaderLimits, HeaderTable};
use crate::io_stream::{TarReader, TarWriter, READ_ENTRY_CONTEXT};
use crate::storage::{LocalFs, Storage};

// ── ArchiveOptions ───────────────────────────────────────────────────────────

/// How entry names are turned into extraction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathPolicy {
    /// Join the stored name onto `output_dir` as-is.  An absolute name
    /// replaces `output_dir` entirely.
    #[default]
    Verbatim,
    /// Refuse names that are absolute or contain `..`.
    RelativeOnly,
}

/// Configuration for [`Archiver`].
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub limits:      HeaderLimits,
    /// Scratch buffer used when copying data regions.
    pub buffer_size: usize,
    /// Directory entry names are resolved against on extract.  Empty means
    /// the current directory.
    pub output_dir:  PathBuf,
    pub path_policy: PathPolicy,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            limits:      HeaderLimits::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            output_dir:  PathBuf::new(),
            path_policy: PathPolicy::Verbatim,
        }
    }
}

// ── Summaries ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateSummary {
    pub entries:     usize,
    pub header_size: u64,
    pub data_size:   u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: usize,
    pub bytes:   u64,
}

// ── Archiver ─────────────────────────────────────────────────────────────────

pub struct Archiver<S: Storage = LocalFs> {
    storage: S,
    options: ArchiveOptions,
}

impl Default for Archiver<LocalFs> {
    fn default() -> Self {
        Self::new(ArchiveOptions::default())
    }
}

impl Archiver<LocalFs> {
    pub fn new(options: ArchiveOptions) -> Self {
        Self::with_storage(LocalFs, options)
    }
}

impl<S: Storage> Archiver<S> {
    pub fn with_storage(storage: S, options: ArchiveOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ── Create ───────────────────────────────────────────────────────────────

    /// Pack `file_paths`, in order, into a new archive at `archive_path`.
    ///
    /// Each path is stored verbatim as the entry name.  The header region is
    /// reserved first, every input is streamed into the data section, and
    /// the header is written last.  On failure the archive is left
    /// incomplete.
    pub fn create<P: AsRef<Path>>(
        &self,
        file_paths:   &[P],
        archive_path: impl AsRef<Path>,
    ) -> Result<CreateSummary, ArchiveError> {
        let archive_path = archive_path.as_ref();
        let names = file_paths
            .iter()
            .map(|p| path_to_name(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let archive = self.storage.create_archive(archive_path)
            .map_err(|source| ArchiveError::CannotOpenArchive {
                path: archive_path.to_path_buf(),
                source,
            })?;
        let mut writer = TarWriter::with_options(
            archive,
            names,
            self.options.limits,
            self.options.buffer_size,
        )
        .map_err(|e| e.path(archive_path))?;

        for path in file_paths {
            let path = path.as_ref();
            let mut input = self.storage.open_input(path)
                .map_err(|source| ArchiveError::CannotOpenInput {
                    path: path.to_path_buf(),
                    source,
                })?;
            writer.append(&mut input).map_err(|e| match e {
                ArchiveError::Io { context: READ_ENTRY_CONTEXT, .. } => e.path(path),
                other => other.path(archive_path),
            })?;
        }

        let summary = CreateSummary {
            entries:     writer.table().len(),
            header_size: writer.header_size(),
            data_size:   writer.table().total_data_size(),
        };
        writer.finish().map_err(|e| e.path(archive_path))?;

        tracing::info!(
            archive = %archive_path.display(),
            entries = summary.entries,
            bytes = summary.header_size + summary.data_size,
            "created archive"
        );
        Ok(summary)
    }

    // ── Extract ──────────────────────────────────────────────────────────────

    /// Recreate every entry of the archive at `archive_path`.
    ///
    /// Entries are written in header order.  Files extracted before a
    /// failure stay on disk.  A data region shorter than its declared size
    /// fails with [`ArchiveError::TruncatedData`] after the short file has
    /// been written.
    pub fn extract(&self, archive_path: impl AsRef<Path>) -> Result<ExtractSummary, ArchiveError> {
        let archive_path = archive_path.as_ref();
        let mut reader = self.open_reader(archive_path)?;

        let mut bytes = 0u64;
        for index in 0..reader.table().len() {
            let HeaderEntry { name, size } = reader.table()[index].clone();
            let target = self.target_path(&name)?;

            let mut output = self.storage.create_output(&target)
                .map_err(|source| ArchiveError::CannotCreateOutput {
                    path: target.clone(),
                    source,
                })?;
            let copied = reader.copy_entry(index, &mut output)
                .map_err(wrap_io_err!(archive_path, "Extracting entry data"))?;
            output.flush()
                .map_err(wrap_io_err!(&target, "Flushing output"))?;
            drop(output);

            if copied < u64::from(size) {
                return Err(ArchiveError::TruncatedData { name, expected: size, actual: copied });
            }
            tracing::debug!(name = %name, target = %target.display(), size, "extracted entry");
            bytes += copied;
        }

        let entries = reader.table().len();
        tracing::info!(archive = %archive_path.display(), entries, bytes, "extracted archive");
        Ok(ExtractSummary { entries, bytes })
    }

    // ── List ─────────────────────────────────────────────────────────────────

    /// Decode and return the header without touching the data section.
    pub fn list(&self, archive_path: impl AsRef<Path>) -> Result<HeaderTable, ArchiveError> {
        Ok(self.open_reader(archive_path.as_ref())?.into_table())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn open_reader(&self, archive_path: &Path) -> Result<TarReader<S::ArchiveIn>, ArchiveError> {
        let archive = self.storage.open_archive(archive_path)
            .map_err(|source| ArchiveError::CannotOpenArchive {
                path: archive_path.to_path_buf(),
                source,
            })?;
        TarReader::with_options(archive, &self.options.limits, self.options.buffer_size)
            .map_err(|source| ArchiveError::CorruptHeader {
                path: archive_path.to_path_buf(),
                source,
            })
    }

    fn target_path(&self, name: &str) -> Result<PathBuf, ArchiveError> {
        let relative = Path::new(name);
        if self.options.path_policy == PathPolicy::RelativeOnly {
            check_path(relative).map_err(|_| ArchiveError::UnsafePath { name: name.to_owned() })?;
        }
        Ok(self.options.output_dir.join(relative))
    }
}

/// Iterate the components of `path` and ensure it cannot climb out of the
/// directory it is joined onto.  Returns the offending component.
pub fn check_path(path: &Path) -> Result<(), PathBuf> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            invalid => {
                let bad_component: &Path = invalid.as_ref();
                return Err(bad_component.to_path_buf());
            }
        }
    }
    Ok(())
}

fn path_to_name(path: &Path) -> Result<String, ArchiveError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| {
            ArchiveError::InvalidHeader(HeaderError::InvalidName(path.to_string_lossy().into_owned()))
        })
}

// ── Free functions ───────────────────────────────────────────────────────────

/// [`Archiver::create`] on the local file system with default options.
pub fn create<P: AsRef<Path>>(
    file_paths:   &[P],
    archive_path: impl AsRef<Path>,
) -> Result<CreateSummary, ArchiveError> {
    Archiver::<LocalFs>::default().create(file_paths, archive_path)
}

/// [`Archiver::extract`] on the local file system with default options.
pub fn extract(archive_path: impl AsRef<Path>) -> Result<ExtractSummary, ArchiveError> {
    Archiver::<LocalFs>::default().extract(archive_path)
}

/// [`Archiver::list`] on the local file system with default options.
pub fn list(archive_path: impl AsRef<Path>) -> Result<HeaderTable, ArchiveError> {
    Archiver::<LocalFs>::default().list(archive_path)
}
