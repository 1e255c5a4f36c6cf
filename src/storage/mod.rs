//! Remote content store access
//!
//! `CloudClient` is the contract the reconciliation core consumes. Two
//! implementations ship with the crate: `HttpCloudClient` talks to the sync
//! API, `LocalStore` keeps objects in a directory.

pub mod http;
pub mod local;

use crate::error::Result;
use crate::types::Index;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use http::HttpCloudClient;
pub use local::LocalStore;

/// Upload authorization bound to exactly one object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadToken(String);

impl UploadToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A remote sync directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDir {
    pub name: String,
    pub size: i64,
}

/// All remote sync directories plus the space they use
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDirListing {
    pub dirs: Vec<SyncDir>,
    #[serde(rename = "size")]
    pub total_size: i64,
}

/// Per-workspace sync metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSyncMeta {
    pub asset_size: i64,
    pub backup_size: i64,
    /// Device that last wrote the remote index
    #[serde(rename = "d", default)]
    pub last_device_id: Option<String>,
}

/// Operations the reconciliation core needs from the remote side
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Full remote manifest of `dir_path`
    async fn fetch_remote_index(&self, dir_path: &str) -> Result<Index>;

    /// One-shot token authorizing the upload of `rel_path` only
    async fn request_upload_token(&self, rel_path: &str, dir_path: &str, length: u64) -> Result<UploadToken>;

    /// Store the file at `local_path` under `key`
    async fn put_object(&self, token: &UploadToken, key: &str, local_path: &Path) -> Result<()>;

    /// Download URL of one object
    async fn get_object_url(&self, dir_path: &str, rel_path: &str) -> Result<String>;

    /// Fetch a download URL within `timeout`
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes>;

    /// Delete several objects in one request
    async fn delete_objects(&self, dir_path: &str, rel_paths: &[String]) -> Result<()>;

    async fn list_sync_directories(&self) -> Result<SyncDirListing>;

    async fn create_sync_directory(&self, name: &str) -> Result<()>;

    async fn remove_sync_directory(&self, dir_path: &str) -> Result<()>;

    async fn workspace_sync_version(&self, dir_path: &str) -> Result<i64>;

    async fn workspace_sync_meta(&self, dir_path: &str) -> Result<WorkspaceSyncMeta>;
}

/// Object key: `{namespace}/{account}/{dir_path}/{rel_path}`
pub fn object_key(namespace: &str, account_id: &str, dir_path: &str, rel_path: &str) -> String {
    [namespace, account_id, dir_path, rel_path]
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
