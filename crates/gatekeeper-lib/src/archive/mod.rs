//! Archive ingestion
//!
//! Expands uploaded chart bundles into request-scoped scratch directories.
//! Supports `.zip` and gzip-compressed tarballs (`.tar.gz` / `.tgz`).
//! Entries that would land outside the scratch directory (absolute paths,
//! `..` components, links) abort the extraction.

mod tarball;
mod zipped;


use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Default cap on the total number of bytes written during one extraction
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 256 * 1024 * 1024;

/// Errors raised while expanding an archive. All of them are request-fatal.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Unsupported archive format for '{0}', use .zip, .tar.gz or .tgz")]
    UnsupportedFormat(String),

    #[error("Unsafe archive entry '{0}' would be written outside the scratch directory")]
    Unsafe(String),

    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("Archive expands beyond the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("I/O error while extracting archive: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    /// True when the archive was rejected by its name alone
    pub fn is_format_error(&self) -> bool {
        matches!(self, ArchiveError::UnsupportedFormat(_))
    }
}

/// Supported archive containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Infer the container from the declared filename
    pub fn from_filename(filename: &str) -> Result<Self, ArchiveError> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else {
            Err(ArchiveError::UnsupportedFormat(filename.to_string()))
        }
    }

    /// Filename without directories or the archive extension
    pub fn stem<'a>(&self, filename: &'a str) -> &'a str {
        let base = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(filename);
        let suffix_len = match self {
            ArchiveKind::Zip => ".zip".len(),
            ArchiveKind::TarGz if base.to_ascii_lowercase().ends_with(".tar.gz") => ".tar.gz".len(),
            ArchiveKind::TarGz => ".tgz".len(),
        };
        &base[..base.len().saturating_sub(suffix_len)]
    }
}

/// Single-use scratch directory owned by one submission.
///
/// The directory and everything below it is removed when the value is
/// dropped or closed.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Allocate a fresh directory under `root`, or under the OS temp dir
    pub fn allocate(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gatekeeper-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Allocated scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory, reporting failures instead of ignoring them
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Expand `bytes` into `dest`, writing at most `max_bytes` of file content
pub fn extract_archive(
    kind: ArchiveKind,
    bytes: &[u8],
    dest: &Path,
    max_bytes: u64,
) -> Result<(), ArchiveError> {
    let mut budget = ByteBudget::new(max_bytes);
    match kind {
        ArchiveKind::Zip => zipped::extract(bytes, dest, &mut budget)?,
        ArchiveKind::TarGz => tarball::extract(bytes, dest, &mut budget)?,
    }
    debug!(
        dest = %dest.display(),
        bytes_written = budget.used(),
        "Archive extracted"
    );
    Ok(())
}

/// Map an archive entry name onto `dest`.
///
/// Returns `Ok(None)` for names that refer to `dest` itself (e.g. `./`).
pub(crate) fn sanitize_entry_path(dest: &Path, name: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::Unsafe(name.display().to_string()));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(dest.join(relative)))
}

/// Write a regular file entry, creating parent directories as needed
pub(crate) fn write_entry(
    target: &Path,
    reader: &mut impl Read,
    budget: &mut ByteBudget,
) -> Result<(), ArchiveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(target)?;
    budget.copy(reader, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Tracks bytes written across all entries of one archive
pub(crate) struct ByteBudget {
    limit: u64,
    remaining: u64,
}

impl ByteBudget {
    fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    fn used(&self) -> u64 {
        self.limit - self.remaining
    }

    fn copy(&mut self, reader: &mut impl Read, writer: &mut impl Write) -> Result<(), ArchiveError> {
        // One byte past the budget is enough to detect an overflow
        let mut limited = reader.take(self.remaining.saturating_add(1));
        let written = io::copy(&mut limited, writer).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
                ArchiveError::Corrupt(e.to_string())
            }
            _ => ArchiveError::Io(e),
        })?;
        if written > self.remaining {
            return Err(ArchiveError::TooLarge { limit: self.limit });
        }
        self.remaining -= written;
        Ok(())
    }
}
