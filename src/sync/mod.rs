//! Sync engine and orchestration

pub mod diff;
pub mod execute;
pub mod scan;
pub mod schedule;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::etag::{ContentHasher, Etag};
use crate::exclude::ExclusionPolicy;
use crate::index::{load_local_index, save_local_index};
use crate::progress::TransferProfile;
use crate::storage::CloudClient;
use crate::types::{Index, TransferDirection, TransferStats};
use execute::TransferExecutor;
use schedule::{run_pool, PoolOptions, TransferCounters};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reconciles local directories with a remote content store
pub struct SyncEngine {
    config: Config,
    client: Arc<dyn CloudClient>,
    hasher: Arc<dyn ContentHasher>,
}

impl SyncEngine {
    /// Create an engine hashing with the ETag algorithm
    pub fn new(config: Config, client: Arc<dyn CloudClient>) -> Self {
        Self {
            config,
            client,
            hasher: Arc::new(Etag),
        }
    }

    /// Replace the content hasher
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    fn policy(&self, local_dir: &Path) -> ExclusionPolicy {
        ExclusionPolicy::new(local_dir, &self.config.ignore, self.config.max_object_size)
    }

    fn pool_options(&self, direction: TransferDirection, items: usize, profile: &TransferProfile) -> PoolOptions {
        PoolOptions {
            workers: self.config.effective_pool_size(items),
            progress_threshold: self.config.progress_threshold,
            direction,
            progress: profile.progress.clone(),
        }
    }

    /// Make `local_dir` match the remote directory `remote_dir`
    ///
    /// Local files unknown to the remote index are removed, changed or
    /// missing files are fetched. On success the remote index becomes the
    /// local index cache.
    pub async fn download(&self, local_dir: &Path, remote_dir: &str, profile: &TransferProfile) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        if !local_dir.is_dir() {
            tracing::info!(local = %local_dir.display(), "Local directory missing, nothing to download");
            return Ok(stats);
        }

        let remote = self.client.fetch_remote_index(remote_dir).await?;
        tracing::info!(remote = %remote_dir, entries = remote.len(), "Fetched remote index");

        let diff = {
            let root = local_dir.to_path_buf();
            let remote = remote.clone();
            let policy = self.policy(local_dir);
            let hasher = self.hasher.clone();
            blocking(move || diff::pull_diff(&root, &remote, &policy, hasher.as_ref())).await?
        };
        tracing::info!(
            removes = diff.local_removes.len(),
            fetches = diff.remote_fetches.len(),
            "Download plan ready"
        );

        for path in &diff.local_removes {
            match tokio::fs::remove_file(path).await {
                Ok(()) => stats.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Local remove failed");
                    return Err(Error::io(format!("removing {}", path.display()), e));
                }
            }
        }

        let executor = Arc::new(TransferExecutor::new(
            self.client.clone(),
            &self.config,
            local_dir,
            remote_dir,
            profile.timeout,
        ));
        let options = self.pool_options(TransferDirection::Download, diff.remote_fetches.len(), profile);
        let counters = Arc::new(TransferCounters::new());

        run_pool(diff.remote_fetches, &options, counters.clone(), move |rel: String| {
            let executor = executor.clone();
            async move { executor.download(&rel).await }
        })
        .await?;

        stats.files_transferred = counters.files();
        stats.bytes_transferred = counters.bytes();

        let root = local_dir.to_path_buf();
        blocking(move || save_local_index(&root, &remote)).await?;

        tracing::info!(
            files = stats.files_transferred,
            bytes = stats.bytes_transferred,
            removed = stats.files_removed,
            "Download complete"
        );
        Ok(stats)
    }

    /// Make the remote directory `remote_dir` match `local_dir`
    ///
    /// When `remote_device_id` names this device, the local index cache
    /// stands in for the remote index. Data objects go first, the index
    /// object strictly after all of them, remote removals last in one call.
    pub async fn upload(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        remote_device_id: &str,
        profile: &TransferProfile,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        if !local_dir.is_dir() {
            tracing::info!(local = %local_dir.display(), "Local directory missing, nothing to upload");
            return Ok(stats);
        }

        let remote = self.baseline_index(local_dir, remote_dir, remote_device_id).await?;

        let diff = {
            let root = local_dir.to_path_buf();
            let policy = self.policy(local_dir);
            let hasher = self.hasher.clone();
            blocking(move || diff::push_diff(&root, &remote, &policy, hasher.as_ref())).await?
        };
        tracing::info!(
            upserts = diff.local_upserts.len(),
            index = diff.index_upsert.is_some(),
            removes = diff.remote_removes.len(),
            "Upload plan ready"
        );
        if diff.is_idle() {
            tracing::info!(remote = %remote_dir, "Remote content already current, refreshing index only");
        }

        let executor = Arc::new(TransferExecutor::new(
            self.client.clone(),
            &self.config,
            local_dir,
            remote_dir,
            profile.timeout,
        ));
        let options = self.pool_options(TransferDirection::Upload, diff.local_upserts.len(), profile);
        let counters = Arc::new(TransferCounters::new());

        let pool_executor = executor.clone();
        run_pool(diff.local_upserts, &options, counters.clone(), move |path: PathBuf| {
            let executor = pool_executor.clone();
            async move { executor.upload(&path).await }
        })
        .await?;

        if let Some(index) = &diff.index_upsert {
            let size = executor.upload(index).await?;
            counters.record(size);
        }

        if !diff.remote_removes.is_empty() {
            self.client.delete_objects(remote_dir, &diff.remote_removes).await?;
            stats.files_removed = diff.remote_removes.len() as u64;
        }

        stats.files_transferred = counters.files();
        stats.bytes_transferred = counters.bytes();

        tracing::info!(
            files = stats.files_transferred,
            bytes = stats.bytes_transferred,
            removed = stats.files_removed,
            "Upload complete"
        );
        Ok(stats)
    }

    /// Index the push diff compares against
    async fn baseline_index(&self, local_dir: &Path, remote_dir: &str, remote_device_id: &str) -> Result<Index> {
        let device = self.config.device_id.as_str();
        if !device.is_empty() && device == remote_device_id {
            let root = local_dir.to_path_buf();
            match blocking(move || load_local_index(&root)).await {
                Ok(index) => {
                    tracing::debug!(device, "Last writer was this device, using local index");
                    return Ok(index);
                }
                Err(e) => {
                    tracing::info!(error = %e, "Local index unavailable, fetching remote index");
                }
            }
        }
        self.client.fetch_remote_index(remote_dir).await
    }
}

/// Run filesystem-heavy work off the async executor
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::transfer("blocking task", e.to_string()))?
}
