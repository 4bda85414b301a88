//! Zip expansion

use super::{sanitize_entry_path, write_entry, ArchiveError, ByteBudget};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

/// File type bits of a unix mode
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub(super) fn extract(bytes: &[u8], dest: &Path, budget: &mut ByteBudget) -> Result<(), ArchiveError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let name = entry.name().to_string();

        if entry
            .unix_mode()
            .map(|mode| mode & S_IFMT == S_IFLNK)
            .unwrap_or(false)
        {
            return Err(ArchiveError::Unsafe(name));
        }

        let Some(target) = sanitize_entry_path(dest, Path::new(&name))? else {
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            write_entry(&target, &mut entry, budget)?;
        }
    }

    Ok(())
}
