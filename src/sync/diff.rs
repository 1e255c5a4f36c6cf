//! Diff computation between the local tree and a remote index
//!
//! Files are compared by content hash only. Modification times are never
//! consulted: clocks drift between devices, hashes do not.
//!
//! - Pull: local files unknown to the remote are removed, remote entries
//!   whose hash differs from (or is missing in) the local tree are fetched.
//! - Push: remote entries with no local file are removed, local files whose
//!   hash differs from (or is missing in) the remote index are uploaded.
//!
//! Oversized files are skipped with a warning in both directions and are
//! neither transferred nor deleted. A file that cannot be hashed during a
//! push is neither uploaded nor removed, and its previous remote record is
//! carried into the regenerated index.

use crate::error::{Error, Result};
use crate::etag::ContentHasher;
use crate::exclude::ExclusionPolicy;
use crate::index::{hash_tree, index_path, local_path, save_local_index, INDEX_FILE};
use crate::sync::scan::scan_local;
use crate::types::{Index, PullDiff, PushDiff};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Compute what a pull must remove locally and fetch from the remote
pub fn pull_diff(
    root: &Path,
    remote: &Index,
    policy: &ExclusionPolicy,
    hasher: &dyn ContentHasher,
) -> Result<PullDiff> {
    let mut diff = PullDiff::default();
    let mut unchanged: HashSet<&str> = HashSet::new();

    for file in scan_local(root)? {
        if file.rel == INDEX_FILE {
            continue;
        }

        let Some((rel, record)) = remote.get_key_value(file.rel.as_str()) else {
            if policy.is_oversized(file.size) {
                tracing::warn!(
                    path = %file.path.display(),
                    size = file.size,
                    "Local file exceeds size limit, keeping it"
                );
                continue;
            }
            if policy.is_excluded(&file.path) {
                tracing::debug!(path = %file.path.display(), "Keeping excluded file");
                continue;
            }
            tracing::debug!(path = %file.path.display(), "Not in remote index, removing");
            diff.local_removes.push(file.path);
            continue;
        };

        match hasher.hash_file(&file.path) {
            Ok(hash) if record.same_content(&hash) => {
                unchanged.insert(rel.as_str());
            }
            Ok(_) => {
                tracing::debug!(path = %file.path.display(), "Content differs");
            }
            Err(source) => {
                let err = Error::hash(file.path, source);
                tracing::error!(error = %err, "Hashing local file failed, fetching it again");
            }
        }
    }

    for (rel, record) in remote {
        if unchanged.contains(rel.as_str()) || rel == INDEX_FILE {
            continue;
        }
        if policy.is_oversized(record.size) {
            tracing::warn!(path = %rel, size = record.size, "Remote file exceeds size limit, not fetching it");
            continue;
        }
        diff.remote_fetches.push(rel.clone());
    }

    tracing::debug!(
        removes = diff.local_removes.len(),
        fetches = diff.remote_fetches.len(),
        unchanged = unchanged.len(),
        "Pull diff complete"
    );

    Ok(diff)
}

/// Compute what a push must upload and remove remotely
///
/// Regenerates the local index file as a side effect. The index object is
/// always scheduled for upload.
pub fn push_diff(
    root: &Path,
    remote: &Index,
    policy: &ExclusionPolicy,
    hasher: &dyn ContentHasher,
) -> Result<PushDiff> {
    let mut diff = PushDiff::default();
    let mut unchanged: HashSet<PathBuf> = HashSet::new();
    let mut unreadable: HashSet<String> = HashSet::new();

    for (rel, record) in remote {
        // The index object is regenerated and sent on every push
        if rel == INDEX_FILE {
            continue;
        }
        let Some(local) = local_path(root, rel) else {
            tracing::warn!(path = %rel, "Remote entry resolves outside the sync root, ignoring it");
            continue;
        };
        if policy.is_excluded(&local) {
            continue;
        }

        if !local.is_file() {
            if policy.is_oversized(record.size) {
                tracing::warn!(path = %rel, size = record.size, "Remote file exceeds size limit, keeping it");
                continue;
            }
            diff.remote_removes.push(rel.clone());
            continue;
        }

        match hasher.hash_file(&local) {
            Ok(hash) if record.same_content(&hash) => {
                unchanged.insert(local);
            }
            Ok(_) => {}
            Err(source) => {
                let err = Error::hash(local, source);
                tracing::error!(error = %err, "Hashing local file failed, skipping it");
                unreadable.insert(rel.clone());
            }
        }
    }

    let (mut index, failed) = hash_tree(root, policy, hasher)?;
    unreadable.extend(failed);
    for rel in &unreadable {
        match remote.get(rel) {
            Some(record) => {
                index.insert(rel.clone(), record.clone());
            }
            None => {
                index.remove(rel);
            }
        }
    }
    save_local_index(root, &index)?;
    tracing::debug!(root = %root.display(), entries = index.len(), "Local index regenerated");

    let index_file = index_path(root);
    for file in scan_local(root)? {
        if file.path == index_file {
            diff.index_upsert = Some(file.path);
            continue;
        }
        if unchanged.contains(&file.path) || unreadable.contains(&file.rel) || policy.is_excluded(&file.path) {
            continue;
        }
        if policy.is_oversized(file.size) {
            tracing::warn!(
                path = %file.path.display(),
                size = file.size,
                "Local file exceeds size limit, not uploading it"
            );
            continue;
        }
        diff.local_upserts.push(file.path);
    }

    tracing::debug!(
        upserts = diff.local_upserts.len(),
        removes = diff.remote_removes.len(),
        unchanged = unchanged.len(),
        unreadable = unreadable.len(),
        "Push diff complete"
    );

    Ok(diff)
}
