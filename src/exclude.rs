//! Exclusion policy: ignore patterns and the single-object size ceiling
//!
//! Ignore patterns are opaque to this crate. Each `/`-separated segment is
//! hashed to the 7-hex-digit prefix of its SHA-256, giving the relative path
//! the pattern occupies on disk. Excluded paths are never uploaded and never
//! considered for deletion.

use crate::index::local_path;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Hex digits kept from each segment's SHA-256
const SEGMENT_HASH_LEN: usize = 7;

/// Set of excluded absolute paths plus the size ceiling
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    excludes: HashSet<PathBuf>,
    max_object_size: u64,
}

impl ExclusionPolicy {
    /// Resolve `ignore` patterns against `root`
    pub fn new(root: &Path, ignore: &[String], max_object_size: u64) -> Self {
        let excludes = ignore
            .iter()
            .map(|pattern| pattern.trim_matches('/'))
            .filter(|pattern| !pattern.is_empty())
            .filter_map(|pattern| local_path(root, &hash_path_segments(pattern)))
            .collect();

        Self {
            excludes,
            max_object_size,
        }
    }

    /// Policy with no ignore patterns
    pub fn size_only(max_object_size: u64) -> Self {
        Self {
            excludes: HashSet::new(),
            max_object_size,
        }
    }

    /// Whether `path` or one of its ancestors is excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        !self.excludes.is_empty() && path.ancestors().any(|p| self.excludes.contains(p))
    }

    /// Whether an object of `size` bytes exceeds the ceiling
    pub fn is_oversized(&self, size: u64) -> bool {
        size > self.max_object_size
    }
}

/// Map every segment of `pattern` to its short SHA-256 hex
pub fn hash_path_segments(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            let digest = Sha256::digest(segment.as_bytes());
            let mut hex = format!("{:x}", digest);
            hex.truncate(SEGMENT_HASH_LEN);
            hex
        })
        .collect::<Vec<_>>()
        .join("/")
}
