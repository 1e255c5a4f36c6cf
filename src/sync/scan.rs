//! Local tree walking for the diff engine

use crate::error::{Error, Result};
use crate::index::relative_path;
use std::path::{Path, PathBuf};

/// A regular file found under the sync root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute path
    pub path: PathBuf,

    /// Slash-separated path relative to the root
    pub rel: String,

    /// Size in bytes
    pub size: u64,
}

/// Walk `root` and return every regular file, sorted by path
///
/// Directories and symlinks are not reported. Entries that cannot be read
/// are logged and skipped.
pub fn scan_local(root: &Path) -> Result<Vec<LocalFile>> {
    if !root.is_dir() {
        return Err(Error::NotFound {
            path: root.display().to_string(),
        });
    }

    let mut files = Vec::new();

    for entry in jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(rel) = relative_path(root, &path) else {
            continue;
        };

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot stat file, skipping");
                continue;
            }
        };

        files.push(LocalFile { path, rel, size });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}
