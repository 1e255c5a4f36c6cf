//! Directory-backed content store
//!
//! Objects live at `<root>/<namespace>/<account>/<dir_path>/<rel_path>`,
//! sync directories under `<root>/<namespace>/<account>/sync/`. Useful for
//! syncing to a mounted drive and for exercising the engine without a server.

use super::{object_key, CloudClient, SyncDir, SyncDirListing, UploadToken, WorkspaceSyncMeta};
use crate::error::{Error, Result};
use crate::index::{local_path, parse_index, write_file_atomic, INDEX_FILE};
use crate::types::Index;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;

const URL_SCHEME: &str = "file://";
const TOKEN_PREFIX: &str = "local:";
const SYNC_DIRS: &str = "sync";
const BACKUP_DIR: &str = "backup";

/// Content store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    namespace: String,
    account_id: String,
}

impl LocalStore {
    /// Create a store with the given root path
    pub fn new(root: PathBuf, namespace: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            root,
            namespace: namespace.into(),
            account_id: account_id.into(),
        }
    }

    /// Resolve an object key to its file, refusing keys that leave the root
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        local_path(&self.root, key).ok_or_else(|| Error::transfer(key, "key resolves outside the store root"))
    }

    fn key(&self, dir_path: &str, rel_path: &str) -> String {
        object_key(&self.namespace, &self.account_id, dir_path, rel_path)
    }

    fn dir(&self, dir_path: &str) -> Result<PathBuf> {
        self.resolve(&self.key(dir_path, ""))
    }
}

#[async_trait]
impl CloudClient for LocalStore {
    async fn fetch_remote_index(&self, dir_path: &str) -> Result<Index> {
        let path = self.resolve(&self.key(dir_path, INDEX_FILE))?;
        match fs::read(&path).await {
            Ok(data) => parse_index(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index::new()),
            Err(e) => Err(Error::io("reading remote index", e)),
        }
    }

    async fn request_upload_token(&self, rel_path: &str, dir_path: &str, _length: u64) -> Result<UploadToken> {
        Ok(UploadToken::new(format!("{}{}", TOKEN_PREFIX, self.key(dir_path, rel_path))))
    }

    async fn put_object(&self, token: &UploadToken, key: &str, local_path: &Path) -> Result<()> {
        if token.as_str().strip_prefix(TOKEN_PREFIX) != Some(key) {
            return Err(Error::auth(format!("upload token is not valid for {}", key)));
        }

        let data = fs::read(local_path)
            .await
            .map_err(|e| Error::io(format!("reading {}", local_path.display()), e))?;
        let dest = self.resolve(key)?;
        tokio::task::spawn_blocking(move || write_file_atomic(&dest, &data))
            .await
            .map_err(|e| Error::transfer(key, e.to_string()))?
    }

    async fn get_object_url(&self, dir_path: &str, rel_path: &str) -> Result<String> {
        let path = self.resolve(&self.key(dir_path, rel_path))?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::NotFound {
                path: rel_path.to_string(),
            });
        }
        Ok(format!("{}{}", URL_SCHEME, path.display()))
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let path = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| Error::transfer(url, "not a local store URL"))?;

        let read = tokio::time::timeout(timeout, fs::read(path))
            .await
            .map_err(|_| Error::transfer(url, "timed out"))?;
        match read {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
                path: url.to_string(),
            }),
            Err(e) => Err(Error::io("reading object", e)),
        }
    }

    async fn delete_objects(&self, dir_path: &str, rel_paths: &[String]) -> Result<()> {
        for rel in rel_paths {
            let path = self.resolve(&self.key(dir_path, rel))?;
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(format!("removing {}", rel), e)),
            }
        }
        Ok(())
    }

    async fn list_sync_directories(&self) -> Result<SyncDirListing> {
        let parent = self.dir(SYNC_DIRS)?;
        let mut listing = SyncDirListing::default();

        let mut entries = match fs::read_dir(&parent).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(Error::io("listing sync directories", e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let size = dir_size(entry.path()).await?;
            listing.total_size += size;
            listing.dirs.push(SyncDir {
                name: entry.file_name().to_string_lossy().into_owned(),
                size,
            });
        }

        listing.dirs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn create_sync_directory(&self, name: &str) -> Result<()> {
        let path = self.dir(&format!("{}/{}", SYNC_DIRS, name))?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::io("creating sync directory", e))
    }

    async fn remove_sync_directory(&self, dir_path: &str) -> Result<()> {
        let path = self.dir(dir_path)?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("removing sync directory", e)),
        }
    }

    async fn workspace_sync_version(&self, dir_path: &str) -> Result<i64> {
        let path = self.resolve(&self.key(dir_path, INDEX_FILE))?;
        match fs::metadata(&path).await {
            Ok(meta) => {
                let modified = meta.modified()?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                Ok(millis)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::io("reading sync version", e)),
        }
    }

    async fn workspace_sync_meta(&self, dir_path: &str) -> Result<WorkspaceSyncMeta> {
        Ok(WorkspaceSyncMeta {
            asset_size: dir_size(self.dir(dir_path)?).await?,
            backup_size: dir_size(self.dir(BACKUP_DIR)?).await?,
            last_device_id: None,
        })
    }
}

/// Total bytes of regular files under `path`, zero if it does not exist
async fn dir_size(path: PathBuf) -> Result<i64> {
    tokio::task::spawn_blocking(move || {
        if !path.is_dir() {
            return 0;
        }
        jwalk::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len() as i64)
            .sum()
    })
    .await
    .map_err(|e| Error::io("sizing directory", std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}
