use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Errors reported by a blob-store backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("no such key")]
    NoSuchKey,

    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    #[error("service error: {0}")]
    Service(String),
}

/// Body and served version of a fetched object.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    pub body: Bytes,
    /// Version the backend actually served, if the bucket is versioned.
    pub version_id: Option<String>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Full object keys, in backend order.
    pub keys: Vec<String>,
    /// Token for the next page; `None` when the listing is complete.
    pub next_token: Option<String>,
}

/// A versioned object store reachable in one region.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<GetObjectOutput, BlobError>;

    /// Store `body` at `key`, returning the version id the backend assigned.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes)
        -> Result<Option<String>, BlobError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, BlobError>;
}

/// Discovers bucket regions and builds region-scoped clients.
#[async_trait]
pub trait BlobStoreProvider: Send + Sync {
    async fn bucket_region(&self, bucket: &str) -> Result<String, BlobError>;

    async fn client_for_region(&self, region: &str) -> Result<Arc<dyn BlobStore>, BlobError>;
}
