use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::blob::{BlobError, BlobStore, BlobStoreProvider, GetObjectOutput, ListPage};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct ObjectVersion {
    version_id: String,
    body: Bytes,
}

type Bucket = BTreeMap<String, Vec<ObjectVersion>>;

/// In-memory, versioned object store.
///
/// Intended for tests and embedding. Every put appends a new version with a
/// fresh UUIDv7 id; reads serve the newest version unless one is pinned.
/// Listings are paginated with `page_size` keys per page.
pub struct InMemoryBlobStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    page_size: usize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Create an empty bucket. Existing buckets are left untouched.
    pub fn create_bucket(&self, name: &str) {
        self.buckets
            .write()
            .expect("lock poisoned")
            .entry(name.to_owned())
            .or_default();
    }

    /// Number of distinct keys in `bucket`.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }

    /// Number of stored versions of `key`.
    pub fn version_count(&self, bucket: &str, key: &str) -> usize {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .and_then(|b| b.get(key))
            .map_or(0, Vec::len)
    }

    /// All keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<GetObjectOutput, BlobError> {
        let buckets = self.buckets.read().expect("lock poisoned");
        let versions = buckets
            .get(bucket)
            .ok_or_else(|| BlobError::NoSuchBucket(bucket.to_owned()))?
            .get(key)
            .ok_or(BlobError::NoSuchKey)?;
        let found = match version_id {
            Some(wanted) => versions.iter().find(|v| v.version_id == wanted),
            None => versions.last(),
        }
        .ok_or(BlobError::NoSuchKey)?;
        Ok(GetObjectOutput {
            body: found.body.clone(),
            version_id: Some(found.version_id.clone()),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<Option<String>, BlobError> {
        let mut buckets = self.buckets.write().expect("lock poisoned");
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobError::NoSuchBucket(bucket.to_owned()))?;
        let version_id = Uuid::now_v7().simple().to_string();
        objects.entry(key.to_owned()).or_default().push(ObjectVersion {
            version_id: version_id.clone(),
            body,
        });
        Ok(Some(version_id))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, BlobError> {
        let buckets = self.buckets.read().expect("lock poisoned");
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BlobError::NoSuchBucket(bucket.to_owned()))?;

        let mut keys = Vec::new();
        let mut next_token = None;
        let candidates = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.map_or(true, |after| k.as_str() > after));
        for key in candidates {
            if keys.len() == self.page_size {
                next_token = keys.last().cloned();
                break;
            }
            keys.push(key.clone());
        }
        Ok(ListPage { keys, next_token })
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.buckets.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryBlobStore")
            .field("bucket_count", &count)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Provider serving every bucket of one [`InMemoryBlobStore`] from a single region.
#[derive(Debug)]
pub struct InMemoryProvider {
    store: Arc<InMemoryBlobStore>,
    region: String,
    region_lookups: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new(store: Arc<InMemoryBlobStore>, region: impl Into<String>) -> Self {
        Self {
            store,
            region: region.into(),
            region_lookups: AtomicUsize::new(0),
        }
    }

    /// How many times a bucket region was looked up.
    pub fn region_lookups(&self) -> usize {
        self.region_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStoreProvider for InMemoryProvider {
    async fn bucket_region(&self, bucket: &str) -> Result<String, BlobError> {
        self.region_lookups.fetch_add(1, Ordering::SeqCst);
        let known = self
            .store
            .buckets
            .read()
            .expect("lock poisoned")
            .contains_key(bucket);
        if known {
            Ok(self.region.clone())
        } else {
            Err(BlobError::NoSuchBucket(bucket.to_owned()))
        }
    }

    async fn client_for_region(&self, region: &str) -> Result<Arc<dyn BlobStore>, BlobError> {
        if region != self.region {
            return Err(BlobError::Service(format!("unknown region {region}")));
        }
        Ok(Arc::clone(&self.store) as Arc<dyn BlobStore>)
    }
}
