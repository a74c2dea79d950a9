//! Quilt package manifests.
//!
//! A [`Manifest`] is an immutable, logical-key-sorted set of [`Entry`] values
//! plus package-level metadata. It is identified by its *top hash*: a SHA-256
//! over the canonical header followed by one canonical row per entry.
//!
//! # Wire format
//!
//! Manifests are stored as JSON lines. Line 1 is the header object, which
//! must carry `"version": "v0"`. Every following line is one entry:
//!
//! ```text
//! {"logical_key": "...", "physical_keys": ["s3://..."], "size": 5,
//!  "hash": {"type": "SHA256", "value": "..."}, "meta": {...}}
//! ```
//!
//! Rows without physical keys are reserved for directory-level metadata and
//! are skipped on load.

pub mod codec;
pub mod entry;
pub mod error;
pub mod from_fs;
pub mod manifest;

pub use entry::{Entry, Hash, HashType};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{Manifest, ManifestBuilder, MANIFEST_VERSION};
