use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{AppError, Result};
use crate::utils::has_allowed_extension;

/// Recursively list files under `root` whose extension is in `extensions`.
///
/// Symlinks are not followed and unreadable entries are skipped. The result
/// is sorted so repeated scans of the same tree agree.
pub fn list_images<P, S>(root: P, extensions: &[S]) -> Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(AppError::NotFound(format!(
            "directory not found: {}",
            root.display()
        )));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if has_allowed_extension(entry.path(), extensions) {
            images.push(entry.into_path());
        }
    }

    images.sort();
    log::debug!("Found {} image(s) under {}", images.len(), root.display());
    Ok(images)
}
