//! Shared fixtures: a call-recording, fault-injecting content store

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ossync::config::Config;
use ossync::error::{Error, Result};
use ossync::storage::{CloudClient, LocalStore, SyncDirListing, UploadToken, WorkspaceSyncMeta};
use ossync::types::Index;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// One call observed by `RecordingClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchIndex,
    Token(String),
    PutStarted(String),
    PutFinished(String),
    ObjectUrl(String),
    /// Relative path and the timeout the fetch was given
    Fetch(String, Duration),
    Delete(Vec<String>),
}

/// How a put for a given relative path misbehaves
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail every attempt with a retryable error
    Always,
    /// Fail every attempt with an authentication error
    Auth,
    /// Fail only the first attempt
    Once,
}

/// `LocalStore` wrapper that records calls and injects put failures
pub struct RecordingClient {
    inner: LocalStore,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<HashMap<String, Fault>>,
    fetch_faults: Mutex<HashSet<String>>,
    put_delay: Mutex<Duration>,
}

impl RecordingClient {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalStore::new(root.to_path_buf(), "ossync", "u1"),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            fetch_faults: Mutex::new(HashSet::new()),
            put_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn fail_put(&self, rel: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(rel.to_string(), fault);
    }

    /// Fail every fetch of `rel` with a retryable error
    pub fn fail_fetch(&self, rel: &str) {
        self.fetch_faults.lock().unwrap().insert(rel.to_string());
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Relative path of an object key under `sync/main`
fn rel_of(key: &str) -> String {
    key.splitn(5, '/').nth(4).unwrap_or(key).to_string()
}

/// Relative path of a `file://` object URL under `sync/main`
fn rel_of_url(url: &str) -> String {
    url.split_once("/ossync/u1/sync/main/")
        .map(|(_, rel)| rel)
        .unwrap_or(url)
        .to_string()
}

#[async_trait]
impl CloudClient for RecordingClient {
    async fn fetch_remote_index(&self, dir_path: &str) -> Result<Index> {
        self.record(Call::FetchIndex);
        self.inner.fetch_remote_index(dir_path).await
    }

    async fn request_upload_token(&self, rel_path: &str, dir_path: &str, length: u64) -> Result<UploadToken> {
        self.record(Call::Token(rel_path.to_string()));
        self.inner.request_upload_token(rel_path, dir_path, length).await
    }

    async fn put_object(&self, token: &UploadToken, key: &str, local_path: &Path) -> Result<()> {
        let rel = rel_of(key);
        self.record(Call::PutStarted(rel.clone()));

        let fault = {
            let mut faults = self.faults.lock().unwrap();
            match faults.get(&rel).cloned() {
                Some(Fault::Once) => {
                    faults.remove(&rel);
                    Some(Fault::Once)
                }
                other => other,
            }
        };
        match fault {
            Some(Fault::Always) | Some(Fault::Once) => return Err(Error::connection("injected failure", None)),
            Some(Fault::Auth) => return Err(Error::auth("session expired")),
            None => {}
        }

        let delay = *self.put_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.inner.put_object(token, key, local_path).await;
        self.record(Call::PutFinished(rel));
        result
    }

    async fn get_object_url(&self, dir_path: &str, rel_path: &str) -> Result<String> {
        self.record(Call::ObjectUrl(rel_path.to_string()));
        self.inner.get_object_url(dir_path, rel_path).await
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let rel = rel_of_url(url);
        self.record(Call::Fetch(rel.clone(), timeout));
        if self.fetch_faults.lock().unwrap().contains(&rel) {
            return Err(Error::connection("injected fetch failure", None));
        }
        self.inner.fetch_bytes(url, timeout).await
    }

    async fn delete_objects(&self, dir_path: &str, rel_paths: &[String]) -> Result<()> {
        self.record(Call::Delete(rel_paths.to_vec()));
        self.inner.delete_objects(dir_path, rel_paths).await
    }

    async fn list_sync_directories(&self) -> Result<SyncDirListing> {
        self.inner.list_sync_directories().await
    }

    async fn create_sync_directory(&self, name: &str) -> Result<()> {
        self.inner.create_sync_directory(name).await
    }

    async fn remove_sync_directory(&self, dir_path: &str) -> Result<()> {
        self.inner.remove_sync_directory(dir_path).await
    }

    async fn workspace_sync_version(&self, dir_path: &str) -> Result<i64> {
        self.inner.workspace_sync_version(dir_path).await
    }

    async fn workspace_sync_meta(&self, dir_path: &str) -> Result<WorkspaceSyncMeta> {
        self.inner.workspace_sync_meta(dir_path).await
    }
}

/// Remote directory used by every test
pub const REMOTE_DIR: &str = "sync/main";

/// Config with fast retries for account `u1`
pub fn test_config() -> Config {
    Config {
        account_id: "u1".to_string(),
        upload_retry_delay_ms: 1,
        ..Config::default()
    }
}

/// Create a test file with specified content
pub fn create_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Get file content
pub fn read_file(dir: &TempDir, name: &str) -> Vec<u8> {
    fs::read(dir.path().join(name)).unwrap()
}

/// Check if file exists
pub fn file_exists(dir: &TempDir, name: &str) -> bool {
    dir.path().join(name).exists()
}

/// Path of a stored object inside the store root
pub fn object_path(store: &TempDir, rel: &str) -> PathBuf {
    store.path().join("ossync/u1").join(REMOTE_DIR).join(rel)
}

/// Write a raw remote object and return its path
pub fn put_remote(store: &TempDir, rel: &str, content: &[u8]) -> PathBuf {
    let path = object_path(store, rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Overwrite the remote index object
pub fn put_remote_index(store: &TempDir, index: &Index) {
    put_remote(store, "index.json", &serde_json::to_vec(index).unwrap());
}
