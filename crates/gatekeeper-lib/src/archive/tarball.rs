//! Gzip-compressed tarball expansion

use super::{sanitize_entry_path, write_entry, ArchiveError, ByteBudget};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use tar::{Archive, EntryType};
use tracing::debug;

fn corrupt(e: io::Error) -> ArchiveError {
    ArchiveError::Corrupt(e.to_string())
}

pub(super) fn extract(bytes: &[u8], dest: &Path, budget: &mut ByteBudget) -> Result<(), ArchiveError> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();
        let entry_type = entry.header().entry_type();

        if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
            return Err(ArchiveError::Unsafe(path.display().to_string()));
        }

        let Some(target) = sanitize_entry_path(dest, &path)? else {
            continue;
        };

        match entry_type {
            EntryType::Directory => fs::create_dir_all(&target)?,
            EntryType::Regular | EntryType::Continuous => write_entry(&target, &mut entry, budget)?,
            other => {
                debug!(path = %path.display(), entry_type = ?other, "Skipping special tar entry");
            }
        }
    }

    Ok(())
}
