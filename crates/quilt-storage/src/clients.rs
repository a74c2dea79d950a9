use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::blob::{BlobError, BlobStore, BlobStoreProvider};
use crate::error::{StorageError, StorageResult};

/// Per-region client cache with memoized bucket-region lookups.
///
/// One cache is shared (behind an `Arc`) by everything that talks to the same
/// set of backends. Both maps are concurrent, so lookups from parallel
/// transfers never serialize on a single lock.
pub struct ClientCache {
    provider: Arc<dyn BlobStoreProvider>,
    regions: DashMap<String, String>,
    clients: DashMap<String, Arc<dyn BlobStore>>,
}

impl ClientCache {
    pub fn new(provider: Arc<dyn BlobStoreProvider>) -> Self {
        Self {
            provider,
            regions: DashMap::new(),
            clients: DashMap::new(),
        }
    }

    /// A cache that can only serve local keys.
    pub fn local_only() -> Self {
        Self::new(Arc::new(NoRemoteBackend))
    }

    /// Region hosting `bucket`, looked up at most once per cache.
    pub async fn region_for_bucket(&self, bucket: &str) -> StorageResult<String> {
        if let Some(region) = self.regions.get(bucket).map(|r| r.value().clone()) {
            return Ok(region);
        }
        let region = self
            .provider
            .bucket_region(bucket)
            .await
            .map_err(|e| StorageError::backend(format!("s3://{bucket}"), e))?;
        tracing::debug!(bucket, region = %region, "resolved bucket region");
        self.regions.insert(bucket.to_owned(), region.clone());
        Ok(region)
    }

    /// Client able to reach `bucket`.
    pub async fn client_for_bucket(&self, bucket: &str) -> StorageResult<Arc<dyn BlobStore>> {
        let region = self.region_for_bucket(bucket).await?;
        if let Some(client) = self.clients.get(&region).map(|c| Arc::clone(c.value())) {
            return Ok(client);
        }
        let client = self
            .provider
            .client_for_region(&region)
            .await
            .map_err(|e| StorageError::backend(format!("s3://{bucket}"), e))?;
        let client = Arc::clone(
            self.clients
                .entry(region)
                .or_insert_with(|| client)
                .value(),
        );
        Ok(client)
    }

    /// Number of regions with a cached client.
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::local_only()
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("regions", &self.regions.len())
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// Provider used when no remote backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteBackend;

#[async_trait]
impl BlobStoreProvider for NoRemoteBackend {
    async fn bucket_region(&self, bucket: &str) -> Result<String, BlobError> {
        Err(BlobError::Service(format!(
            "no remote backend configured for bucket {bucket}"
        )))
    }

    async fn client_for_region(&self, region: &str) -> Result<Arc<dyn BlobStore>, BlobError> {
        Err(BlobError::Service(format!(
            "no remote backend configured for region {region}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBlobStore, InMemoryProvider};

    #[tokio::test]
    async fn region_lookup_is_memoized() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.create_bucket("bkt");
        let provider = Arc::new(InMemoryProvider::new(Arc::clone(&store), "us-east-2"));
        let cache = ClientCache::new(provider.clone());

        assert_eq!(cache.region_for_bucket("bkt").await.unwrap(), "us-east-2");
        assert_eq!(cache.region_for_bucket("bkt").await.unwrap(), "us-east-2");
        assert_eq!(provider.region_lookups(), 1);
    }

    #[tokio::test]
    async fn one_client_per_region() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.create_bucket("a");
        store.create_bucket("b");
        let cache = ClientCache::new(Arc::new(InMemoryProvider::new(store, "eu-west-1")));

        cache.client_for_bucket("a").await.unwrap();
        cache.client_for_bucket("b").await.unwrap();
        assert_eq!(cache.cached_clients(), 1);
    }

    #[tokio::test]
    async fn unknown_bucket_is_a_backend_error() {
        let store = Arc::new(InMemoryBlobStore::new());
        let cache = ClientCache::new(Arc::new(InMemoryProvider::new(store, "us-east-1")));
        let err = cache.client_for_bucket("missing").await.err().expect("expected an error");
        assert!(matches!(err, StorageError::Backend { .. }));
    }

    #[tokio::test]
    async fn local_only_cache_rejects_remote_access() {
        let cache = ClientCache::local_only();
        assert!(cache.client_for_bucket("bkt").await.is_err());
    }
}
