//! Core domain types for ossync

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Content hash and size of one file, independent of its name or mtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// ETag-compatible content digest
    pub hash: String,

    /// File size in bytes
    pub size: u64,
}

impl ContentRecord {
    /// Create a new content record
    pub fn new(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            size,
        }
    }

    /// Two records are unchanged iff their hashes are byte-equal
    pub fn same_content(&self, hash: &str) -> bool {
        self.hash == hash
    }
}

/// Full known state of one side: slash-separated relative path to record
pub type Index = BTreeMap<String, ContentRecord>;

/// Result of the pull (remote to local) diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullDiff {
    /// Absolute local paths with no remote counterpart
    pub local_removes: Vec<PathBuf>,

    /// Relative paths to download
    pub remote_fetches: Vec<String>,
}

/// Result of the push (local to remote) diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushDiff {
    /// Absolute local paths to upload, index file excluded
    pub local_upserts: Vec<PathBuf>,

    /// The freshly generated index file, always uploaded last
    pub index_upsert: Option<PathBuf>,

    /// Relative paths to delete remotely
    pub remote_removes: Vec<String>,
}

impl PushDiff {
    /// Whether anything besides the index needs to move
    pub fn is_idle(&self) -> bool {
        self.local_upserts.is_empty() && self.remote_removes.is_empty()
    }
}

/// Direction of a transfer batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Local to remote
    Upload,

    /// Remote to local
    Download,
}

impl TransferDirection {
    /// Verb used in log and progress messages
    pub fn verb(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "Uploading",
            TransferDirection::Download => "Downloading",
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Files uploaded or downloaded
    pub files_transferred: u64,

    /// Bytes uploaded or downloaded
    pub bytes_transferred: u64,

    /// Local files removed (pull) or remote objects removed (push)
    pub files_removed: u64,
}
