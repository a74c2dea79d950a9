//! Storage locators and blob-store backends for Quilt packages.
//!
//! Every blob a package references is addressed by a [`PhysicalKey`]: either
//! an absolute local path or a bucket/key pair in a versioned object store,
//! optionally pinned to a version id. Keys round-trip through their URI form
//! (`file:///...`, `s3://bucket/key?versionId=...`).
//!
//! # Backends
//!
//! Remote I/O goes through the [`BlobStore`] trait. A [`BlobStoreProvider`]
//! discovers a bucket's region and builds one client per region; the
//! [`ClientCache`] memoizes both lookups and is passed explicitly to every
//! operation that touches a remote key.
//!
//! - [`InMemoryBlobStore`] -- versioned in-process store for tests and embedding
//! - local keys use `tokio::fs` and `walkdir` directly
//!
//! # Rules
//!
//! 1. Local paths are always absolute.
//! 2. A remote key pinned to a version id is a leaf: it cannot be resolved further.
//! 3. Remote writes are last-writer-wins; reads report the version actually served.
//! 4. All backend errors carry the URI of the key that failed.

pub mod blob;
pub mod clients;
pub mod encoding;
pub mod error;
pub mod io;
pub mod key;
pub mod memory;

pub use blob::{BlobError, BlobStore, BlobStoreProvider, GetObjectOutput, ListPage};
pub use clients::{ClientCache, NoRemoteBackend};
pub use error::{StorageError, StorageResult};
pub use io::ByteStream;
pub use key::PhysicalKey;
pub use memory::{InMemoryBlobStore, InMemoryProvider};
