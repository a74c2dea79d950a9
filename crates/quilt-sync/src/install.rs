//! Remote → local package install.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use quilt_manifest::Manifest;
use quilt_storage::{ClientCache, PhysicalKey};
use tokio::io::AsyncWriteExt;

use crate::error::{SyncError, SyncResult};
use crate::types::{InstallResult, TransferConfig};

struct Download<'a> {
    logical_key: &'a str,
    source: &'a PhysicalKey,
    dest: PathBuf,
}

/// Download every entry of `manifest` into `dest`.
///
/// Every destination is checked before anything is written. Downloads are
/// grouped by bucket; each bucket's batch runs concurrently and is joined in
/// full before its first failure is reported.
pub async fn install(
    manifest: &Manifest,
    dest: &Path,
    clients: Arc<ClientCache>,
    config: &TransferConfig,
) -> SyncResult<InstallResult> {
    let root = normalize(&std::path::absolute(dest).map_err(|source| SyncError::Io {
        path: dest.to_path_buf(),
        source,
    })?);

    let mut by_bucket: BTreeMap<&str, Vec<Download<'_>>> = BTreeMap::new();
    for (logical_key, entry) in manifest.entries() {
        let source = entry.physical_key();
        let bucket = source
            .bucket()
            .ok_or_else(|| SyncError::ExpectedRemoteKeys(logical_key.to_owned()))?;
        let dest = resolve_dest(&root, logical_key)?;
        by_bucket.entry(bucket).or_default().push(Download {
            logical_key,
            source,
            dest,
        });
    }

    let mut result = InstallResult::default();
    for (bucket, downloads) in by_bucket {
        tracing::debug!(bucket, files = downloads.len(), "installing batch");
        let outcomes: Vec<SyncResult<u64>> = stream::iter(downloads)
            .map(|download| download_one(download, &clients))
            .boxed()
            .buffered(config.transfer_limit())
            .collect()
            .await;
        for outcome in outcomes {
            result.bytes_written += outcome?;
            result.files_written += 1;
        }
    }

    tracing::info!(
        dest = %root.display(),
        files = result.files_written,
        bytes = result.bytes_written,
        "installed package"
    );
    Ok(result)
}

async fn download_one(download: Download<'_>, clients: &ClientCache) -> SyncResult<u64> {
    let (mut body, _) = download.source.open(clients).await?;
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SyncError::Io { path, source }
    };
    if let Some(parent) = download.dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let mut file = tokio::fs::File::create(&download.dest)
        .await
        .map_err(io_err(&download.dest))?;
    let written = tokio::io::copy(&mut body, &mut file)
        .await
        .map_err(io_err(&download.dest))?;
    file.flush().await.map_err(io_err(&download.dest))?;
    tracing::debug!(logical_key = download.logical_key, dest = %download.dest.display(), "downloaded entry");
    Ok(written)
}

/// Join `logical_key` under `root`, failing if the result leaves `root`.
fn resolve_dest(root: &Path, logical_key: &str) -> SyncResult<PathBuf> {
    let dest = normalize(&root.join(logical_key));
    if dest == root || !dest.starts_with(root) {
        return Err(SyncError::PathEscape {
            logical_key: logical_key.to_owned(),
            dest: root.to_path_buf(),
        });
    }
    Ok(dest)
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
