//! Single-file transfers

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{local_path, relative_path, write_file_atomic};
use crate::retry::{with_retry, RetryConfig};
use crate::storage::{object_key, CloudClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// Moves one file between the local root and a remote directory
#[derive(Clone)]
pub struct TransferExecutor {
    client: Arc<dyn CloudClient>,
    local_root: PathBuf,
    remote_dir: String,
    namespace: String,
    account_id: String,
    retry: RetryConfig,
    /// Per-object fetch timeout
    timeout: Duration,
}

impl TransferExecutor {
    pub fn new(
        client: Arc<dyn CloudClient>,
        config: &Config,
        local_root: &Path,
        remote_dir: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            local_root: local_root.to_path_buf(),
            remote_dir: remote_dir.to_string(),
            namespace: config.namespace.clone(),
            account_id: config.account_id.clone(),
            retry: RetryConfig::from(config),
            timeout,
        }
    }

    /// Remote object key for a relative path
    pub fn object_key(&self, rel: &str) -> String {
        object_key(&self.namespace, &self.account_id, &self.remote_dir, rel)
    }

    /// Fetch `rel` into the local tree, returning the bytes written
    ///
    /// Downloads are not retried.
    pub async fn download(&self, rel: &str) -> Result<u64> {
        let dest = local_path(&self.local_root, rel)
            .ok_or_else(|| Error::transfer(rel, "path resolves outside the local root"))?;
        let url = self.client.get_object_url(&self.remote_dir, rel).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        remove_stale(&dest).await?;

        let data = self.client.fetch_bytes(&url, self.timeout).await?;
        let size = data.len() as u64;

        tokio::task::spawn_blocking(move || write_file_atomic(&dest, &data))
            .await
            .map_err(|e| Error::transfer(rel, e.to_string()))??;

        tracing::debug!(path = %rel, size, "Downloaded");
        Ok(size)
    }

    /// Upload one local file, returning its size
    ///
    /// A fresh token is minted for the exact key. Only the put is retried;
    /// the token stays valid for the same key.
    pub async fn upload(&self, path: &Path) -> Result<u64> {
        let size = fs::metadata(path)
            .await
            .map_err(|e| Error::io(format!("stat {}", path.display()), e))?
            .len();
        let rel = relative_path(&self.local_root, path)
            .ok_or_else(|| Error::transfer(path.display().to_string(), "outside the local root"))?;

        let token = self.client.request_upload_token(&rel, &self.remote_dir, size).await?;
        let key = self.object_key(&rel);

        let client = &self.client;
        let (token, key_ref) = (&token, key.as_str());
        with_retry(&self.retry, &rel, move || client.put_object(token, key_ref, path))
            .await
            .map_err(|e| {
                tracing::error!(path = %rel, key = %key, error = %e, "Put failed");
                match e {
                    Error::Auth { .. } | Error::Cancelled => e,
                    other => Error::transfer(rel.as_str(), other.to_string()),
                }
            })?;

        tracing::debug!(path = %rel, size, "Uploaded");
        Ok(size)
    }
}

/// Clear whatever occupies `dest`, including a directory left behind by
/// files that now live under a different name
async fn remove_stale(dest: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(dest).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest).await,
        Ok(_) => fs::remove_file(dest).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    removed.map_err(|e| Error::io(format!("removing stale {}", dest.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    fn fast_config() -> Config {
        Config {
            account_id: "u1".into(),
            upload_retry_delay_ms: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let store_dir = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let config = fast_config();
        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(store_dir.path().to_path_buf(), "ossync", "u1"));

        std::fs::create_dir_all(src.path().join("notes")).unwrap();
        let file = src.path().join("notes/a.md");
        std::fs::write(&file, b"# hello").unwrap();

        let up = TransferExecutor::new(store.clone(), &config, src.path(), "sync/main", Duration::from_secs(5));
        assert_eq!(up.upload(&file).await.unwrap(), 7);
        assert!(store_dir.path().join("ossync/u1/sync/main/notes/a.md").exists());

        let down = TransferExecutor::new(store, &config, dst.path(), "sync/main", Duration::from_secs(5));
        assert_eq!(down.download("notes/a.md").await.unwrap(), 7);
        assert_eq!(std::fs::read(dst.path().join("notes/a.md")).unwrap(), b"# hello");
    }

    #[tokio::test]
    async fn test_download_replaces_stale_copy() {
        let store_dir = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let object = store_dir.path().join("ossync/u1/sync/main/a.txt");
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"fresh").unwrap();
        std::fs::write(dst.path().join("a.txt"), b"stale and longer").unwrap();

        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(store_dir.path().to_path_buf(), "ossync", "u1"));
        let exec = TransferExecutor::new(store, &fast_config(), dst.path(), "sync/main", Duration::from_secs(5));
        exec.download("a.txt").await.unwrap();

        assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_download_replaces_directory() {
        let store_dir = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let object = store_dir.path().join("ossync/u1/sync/main/a");
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"now a file").unwrap();
        std::fs::create_dir_all(dst.path().join("a/empty")).unwrap();

        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(store_dir.path().to_path_buf(), "ossync", "u1"));
        let exec = TransferExecutor::new(store, &fast_config(), dst.path(), "sync/main", Duration::from_secs(5));
        exec.download("a").await.unwrap();

        assert_eq!(std::fs::read(dst.path().join("a")).unwrap(), b"now a file");
    }

    #[tokio::test]
    async fn test_download_rejects_escaping_path() {
        let store_dir = TempDir::new().unwrap();
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let object = store_dir.path().join("ossync/u1/sync/escaped.txt");
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"outside").unwrap();

        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(store_dir.path().to_path_buf(), "ossync", "u1"));
        let exec = TransferExecutor::new(store, &fast_config(), &root, "sync/main", Duration::from_secs(5));

        assert!(matches!(exec.download("../escaped.txt").await, Err(Error::Transfer { .. })));
        assert!(!parent.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_outside_root() {
        let store_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("x.txt");
        std::fs::write(&file, b"x").unwrap();

        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(store_dir.path().to_path_buf(), "ossync", "u1"));
        let exec = TransferExecutor::new(store, &fast_config(), root.path(), "sync/main", Duration::from_secs(5));
        assert!(matches!(exec.upload(&file).await, Err(Error::Transfer { .. })));
    }

    #[test]
    fn test_object_key() {
        let store: Arc<dyn CloudClient> = Arc::new(LocalStore::new(PathBuf::from("/tmp/x"), "ossync", "u1"));
        let exec = TransferExecutor::new(store, &fast_config(), Path::new("/data"), "sync/main", Duration::from_secs(1));
        assert_eq!(exec.object_key("a/b.txt"), "ossync/u1/sync/main/a/b.txt");
    }
}
