//! Index model: path normalization and the persisted local index
//!
//! The local index lives at `<root>/index.json`. It is regenerated from a
//! full walk before every push diff and doubles as a cache of the remote
//! index when this device was the last one to write it.

use crate::error::{Error, Result};
use crate::etag::ContentHasher;
use crate::exclude::ExclusionPolicy;
use crate::sync::scan::scan_local;
use crate::types::{ContentRecord, Index};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// File name of the index object, relative to the sync root
pub const INDEX_FILE: &str = "index.json";

/// Location of the index file under `root`
pub fn index_path(root: &Path) -> PathBuf {
    root.join(INDEX_FILE)
}

/// Slash-separated path of `path` relative to `root`
///
/// Returns `None` for paths outside `root` and for `root` itself.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Absolute local path for a slash-separated relative path
///
/// Empty segments are ignored. Returns `None` when `rel` names no file or
/// when a segment is `.`, `..` or otherwise not a plain name, so a returned
/// path never leaves `root`.
pub fn local_path(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for segment in rel.split('/').filter(|s| !s.is_empty()) {
        if !is_plain_segment(segment) {
            return None;
        }
        path.push(segment);
        pushed = true;
    }
    pushed.then_some(path)
}

/// Whether `rel` is a well-formed index key: non-empty plain segments only
pub fn is_valid_key(rel: &str) -> bool {
    !rel.is_empty() && rel.split('/').all(is_plain_segment)
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Decode an index document
pub fn parse_index(data: &[u8]) -> Result<Index> {
    let index: Index = serde_json::from_slice(data)?;
    Ok(normalize(index))
}

/// Read the persisted local index
pub fn load_local_index(root: &Path) -> Result<Index> {
    let path = index_path(root);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(Error::io("reading local index", e)),
    };
    parse_index(&data)
}

/// Persist `index` as the local index file
pub fn save_local_index(root: &Path, index: &Index) -> Result<()> {
    let data = serde_json::to_vec(index)?;
    write_file_atomic(&index_path(root), &data)
}

/// Walk `root`, hash every eligible file and overwrite the local index
///
/// Excluded and oversized files are left out, as is the index file itself.
/// A file that cannot be hashed is logged and skipped.
pub fn generate_local_index(
    root: &Path,
    policy: &ExclusionPolicy,
    hasher: &dyn ContentHasher,
) -> Result<Index> {
    let (index, _) = hash_tree(root, policy, hasher)?;
    save_local_index(root, &index)?;
    tracing::debug!(root = %root.display(), entries = index.len(), "Local index regenerated");
    Ok(index)
}

/// Hash every eligible file under `root` without persisting anything
///
/// Returns the index of readable files and the relative paths that could
/// not be hashed.
pub fn hash_tree(
    root: &Path,
    policy: &ExclusionPolicy,
    hasher: &dyn ContentHasher,
) -> Result<(Index, HashSet<String>)> {
    let mut index = Index::new();
    let mut unreadable = HashSet::new();

    for file in scan_local(root)? {
        if file.rel == INDEX_FILE || policy.is_excluded(&file.path) || policy.is_oversized(file.size) {
            continue;
        }

        match hasher.hash_file(&file.path) {
            Ok(hash) => {
                index.insert(file.rel, ContentRecord::new(hash, file.size));
            }
            Err(source) => {
                let err = Error::hash(file.path, source);
                tracing::error!(error = %err, "Leaving unreadable file out of index");
                unreadable.insert(file.rel);
            }
        }
    }

    Ok((index, unreadable))
}

/// Write through a sibling temp file so readers never see partial content
pub fn write_file_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::config(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| Error::io("creating directories", e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::io("creating temp file", e))?;
    tmp.write_all(data)
        .map_err(|e| Error::io("writing temp file", e))?;
    tmp.persist(path)
        .map_err(|e| Error::io("renaming temp file", e.error))?;
    Ok(())
}

// Remote manifests may carry leading slashes. Keys that would resolve
// outside the sync root are dropped.
fn normalize(index: Index) -> Index {
    index
        .into_iter()
        .filter_map(|(rel, record)| {
            let key = rel.trim_start_matches('/');
            if is_valid_key(key) {
                Some((key.to_string(), record))
            } else {
                tracing::warn!(path = %rel, "Dropping index entry with an unusable path");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etag::{etag_from_bytes, Etag};
    use tempfile::TempDir;

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/sync");
        assert_eq!(
            relative_path(root, Path::new("/work/sync/a/b.txt")).as_deref(),
            Some("a/b.txt")
        );
        assert_eq!(relative_path(root, root), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn test_local_path() {
        let root = Path::new("/work/sync");
        assert_eq!(local_path(root, "a/b.txt"), Some(PathBuf::from("/work/sync/a/b.txt")));
        assert_eq!(local_path(root, "/a.txt"), Some(PathBuf::from("/work/sync/a.txt")));
        assert_eq!(local_path(root, "../escaped.txt"), None);
        assert_eq!(local_path(root, "a/../../b.txt"), None);
        assert_eq!(local_path(root, "./a.txt"), None);
        assert_eq!(local_path(root, ""), None);
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("a.txt"));
        assert!(is_valid_key("dir/sub/b.txt"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a//b.txt"));
        assert!(!is_valid_key("dir/"));
        assert!(!is_valid_key(".."));
        assert!(!is_valid_key("dir/./b.txt"));
    }

    #[test]
    fn test_parse_drops_escaping_keys() {
        let index = parse_index(
            br#"{"../escaped.txt":{"hash":"H1","size":1},"a/../../b":{"hash":"H2","size":2},"ok.txt":{"hash":"H3","size":3}}"#,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("ok.txt"));
    }

    #[test]
    fn test_parse_strips_leading_slash() {
        let index = parse_index(br#"{"/a.txt":{"hash":"H1","size":1}}"#).unwrap();
        assert_eq!(index.get("a.txt"), Some(&ContentRecord::new("H1", 1)));
    }

    #[test]
    fn test_load_missing_index() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(load_local_index(tmp.path()), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_generate_local_index() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        std::fs::write(root.join("sub/b.txt"), b"world").unwrap();
        std::fs::write(root.join("big.bin"), vec![0u8; 64]).unwrap();
        std::fs::write(root.join(INDEX_FILE), b"{}").unwrap();

        let policy = ExclusionPolicy::size_only(32);
        let index = generate_local_index(root, &policy, &Etag).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index["a.txt"], ContentRecord::new(etag_from_bytes(b"hello"), 5));
        assert!(index.contains_key("sub/b.txt"));
        assert!(!index.contains_key(INDEX_FILE));
        assert!(!index.contains_key("big.bin"));

        assert_eq!(load_local_index(root).unwrap(), index);
    }

    #[test]
    fn test_hash_tree_reports_unreadable() {
        struct Refuse;
        impl ContentHasher for Refuse {
            fn hash_file(&self, path: &Path) -> std::io::Result<String> {
                if path.ends_with("locked.txt") {
                    return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
                }
                Etag.hash_file(path)
            }
        }

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        std::fs::write(root.join("locked.txt"), b"secret").unwrap();

        let (index, unreadable) = hash_tree(root, &ExclusionPolicy::size_only(1024), &Refuse).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("a.txt"));
        assert_eq!(unreadable, HashSet::from(["locked.txt".to_string()]));
        // Nothing is written
        assert!(!index_path(root).exists());
    }
}
