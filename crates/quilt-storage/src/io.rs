//! Blob I/O through physical keys.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::clients::ClientCache;
use crate::error::{StorageError, StorageResult};
use crate::key::PhysicalKey;

/// Readable blob content.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Depth bound for local directory walks.
pub const MAX_WALK_DEPTH: usize = 1000;

enum ListState {
    Start,
    Next(String),
    Done,
}

impl PhysicalKey {
    /// Open the blob for reading.
    ///
    /// Also returns the effective key: for remote blobs it is pinned to the
    /// version actually served, so re-reads see the same bytes.
    pub async fn open(&self, clients: &ClientCache) -> StorageResult<(ByteStream, PhysicalKey)> {
        match self {
            PhysicalKey::Local { path } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| StorageError::io(path, e))?;
                let reader: ByteStream = Box::pin(file);
                Ok((reader, self.clone()))
            }
            PhysicalKey::Remote {
                bucket,
                key,
                version_id,
            } => {
                let client = clients.client_for_bucket(bucket).await?;
                let output = client
                    .get_object(bucket, key, version_id.as_deref())
                    .await
                    .map_err(|e| StorageError::backend(self.to_uri(), e))?;
                let effective = self.with_version(output.version_id.or_else(|| version_id.clone()));
                let reader: ByteStream = Box::pin(std::io::Cursor::new(output.body));
                Ok((reader, effective))
            }
        }
    }

    /// Read the whole blob into memory.
    pub async fn get_bytes(&self, clients: &ClientCache) -> StorageResult<Bytes> {
        let (mut reader, _) = self.open(clients).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::Io {
                path: PathBuf::from(self.to_uri()),
                source: e,
            })?;
        Ok(Bytes::from(buf))
    }

    /// Overwrite the blob with `data`, returning the key of what was written.
    ///
    /// Remote writes are unconditional; the returned key carries the version
    /// id the backend assigned. Local parent directories are created.
    pub async fn put_bytes(&self, clients: &ClientCache, data: Bytes) -> StorageResult<PhysicalKey> {
        match self {
            PhysicalKey::Local { path } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StorageError::io(parent, e))?;
                }
                tokio::fs::write(path, &data)
                    .await
                    .map_err(|e| StorageError::io(path, e))?;
                Ok(self.clone())
            }
            PhysicalKey::Remote { bucket, key, .. } => {
                let client = clients.client_for_bucket(bucket).await?;
                let version_id = client
                    .put_object(bucket, key, data)
                    .await
                    .map_err(|e| StorageError::backend(self.to_uri(), e))?;
                Ok(PhysicalKey::remote(bucket.clone(), key.clone(), version_id))
            }
        }
    }

    /// Lazily list every blob beneath this key, as `/`-separated paths
    /// relative to it.
    ///
    /// The key is treated as a directory. Remote listings page through the
    /// backend on demand; local walks stop at [`MAX_WALK_DEPTH`]. A missing
    /// local directory lists as empty.
    pub fn list_recursively<'a>(
        &'a self,
        clients: &'a ClientCache,
    ) -> BoxStream<'a, StorageResult<String>> {
        match self {
            PhysicalKey::Local { path } => walk_local(path).boxed(),
            PhysicalKey::Remote { bucket, key, .. } => {
                let prefix = if key.is_empty() || key.ends_with('/') {
                    key.clone()
                } else {
                    format!("{key}/")
                };
                list_remote(clients, bucket, prefix).boxed()
            }
        }
    }
}

/// Entries buffered between the blocking walker and the stream consumer.
const WALK_CHANNEL_CAPACITY: usize = 256;

enum WalkState {
    Pending(PathBuf),
    Running(mpsc::Receiver<StorageResult<String>>),
}

fn walk_local(root: &Path) -> impl futures::Stream<Item = StorageResult<String>> + Send + 'static {
    stream::unfold(WalkState::Pending(root.to_path_buf()), |state| async move {
        let mut rx = match state {
            WalkState::Pending(root) => spawn_walk(root),
            WalkState::Running(rx) => rx,
        };
        let item = rx.recv().await?;
        Some((item, WalkState::Running(rx)))
    })
}

/// Walk `root` on the blocking pool, sending relative file paths to the
/// returned receiver. The walk stops early once the receiver is dropped.
fn spawn_walk(root: PathBuf) -> mpsc::Receiver<StorageResult<String>> {
    let (tx, rx) = mpsc::channel(WALK_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        if !root.is_dir() {
            return;
        }
        for entry in WalkDir::new(&root).max_depth(MAX_WALK_DEPTH) {
            let item = match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let Ok(relative) = entry.path().strip_prefix(&root) else {
                        continue;
                    };
                    let parts: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    Ok(parts.join("/"))
                }
                Ok(_) => continue,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    let source = std::io::Error::other(e.to_string());
                    Err(StorageError::io(path, source))
                }
            };
            if tx.blocking_send(item).is_err() {
                tracing::debug!(root = %root.display(), "local walk abandoned by consumer");
                return;
            }
        }
    });
    rx
}

fn list_remote<'a>(
    clients: &'a ClientCache,
    bucket: &'a str,
    prefix: String,
) -> impl futures::Stream<Item = StorageResult<String>> + Send + 'a {
    stream::try_unfold(ListState::Start, move |state| {
        let prefix = prefix.clone();
        async move {
            let token = match state {
                ListState::Done => return Ok(None),
                ListState::Start => None,
                ListState::Next(token) => Some(token),
            };
            let client = clients.client_for_bucket(bucket).await?;
            let page = client
                .list_objects(bucket, &prefix, token.as_deref())
                .await
                .map_err(|e| StorageError::backend(format!("s3://{bucket}/{prefix}"), e))?;
            let names: Vec<StorageResult<String>> = page
                .keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_owned))
                .map(Ok)
                .collect();
            let next = match page.next_token {
                Some(token) => ListState::Next(token),
                None => ListState::Done,
            };
            Ok::<_, StorageError>(Some((stream::iter(names), next)))
        }
    })
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{InMemoryBlobStore, InMemoryProvider};

    fn remote_cache(page_size: usize) -> (Arc<InMemoryBlobStore>, ClientCache) {
        let store = Arc::new(InMemoryBlobStore::with_page_size(page_size));
        store.create_bucket("bkt");
        let provider = InMemoryProvider::new(Arc::clone(&store), "us-east-1");
        (store, ClientCache::new(Arc::new(provider)))
    }

    // -----------------------------------------------------------------------
    // Local keys
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn local_put_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let clients = ClientCache::local_only();
        let key = PhysicalKey::local(dir.path()).unwrap().resolve("a/b/c.txt").unwrap();

        let written = key.put_bytes(&clients, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(written, key);
        assert_eq!(key.get_bytes(&clients).await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn local_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let key = PhysicalKey::local(dir.path().join("absent")).unwrap();
        let err = key.get_bytes(&ClientCache::local_only()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn local_listing_is_relative_and_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("sub/deeper/leaf.bin"), b"2").unwrap();

        let clients = ClientCache::local_only();
        let root = PhysicalKey::local(dir.path()).unwrap();
        let mut names: Vec<String> = root.list_recursively(&clients).try_collect().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["sub/deeper/leaf.bin", "top.txt"]);
    }

    #[tokio::test]
    async fn large_local_listing_is_complete_and_droppable() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(WALK_CHANNEL_CAPACITY * 2) {
            std::fs::write(dir.path().join(format!("f{i:04}")), b"").unwrap();
        }

        let clients = ClientCache::local_only();
        let root = PhysicalKey::local(dir.path()).unwrap();
        let names: Vec<String> = root.list_recursively(&clients).try_collect().await.unwrap();
        assert_eq!(names.len(), WALK_CHANNEL_CAPACITY * 2);

        let first: Vec<String> = root
            .list_recursively(&clients)
            .take(3)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn missing_local_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let clients = ClientCache::local_only();
        let root = PhysicalKey::local(dir.path().join("nothing-here")).unwrap();
        let names: Vec<String> = root.list_recursively(&clients).try_collect().await.unwrap();
        assert!(names.is_empty());
    }

    // -----------------------------------------------------------------------
    // Remote keys
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn remote_open_pins_served_version() {
        let (_store, clients) = remote_cache(10);
        let key = PhysicalKey::remote("bkt", "data.csv", None);
        let first = key.put_bytes(&clients, Bytes::from_static(b"v1")).await.unwrap();
        key.put_bytes(&clients, Bytes::from_static(b"v2")).await.unwrap();

        let (_, effective) = key.open(&clients).await.unwrap();
        assert!(effective.version_id().is_some());
        assert_ne!(effective.version_id(), first.version_id());

        assert_eq!(first.get_bytes(&clients).await.unwrap(), Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn remote_listing_spans_pages() {
        let (_store, clients) = remote_cache(2);
        for name in ["dir/a", "dir/b", "dir/sub/c", "dirx/d", "other"] {
            PhysicalKey::remote("bkt", name, None)
                .put_bytes(&clients, Bytes::new())
                .await
                .unwrap();
        }
        let dir = PhysicalKey::remote("bkt", "dir", None);
        let names: Vec<String> = dir.list_recursively(&clients).try_collect().await.unwrap();
        assert_eq!(names, vec!["a", "b", "sub/c"]);

        let root = PhysicalKey::remote("bkt", "", None);
        let all: Vec<String> = root.list_recursively(&clients).try_collect().await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn remote_missing_key_is_not_found() {
        let (_store, clients) = remote_cache(10);
        let err = PhysicalKey::remote("bkt", "absent", None)
            .get_bytes(&clients)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
