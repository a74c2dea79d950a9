use std::collections::BTreeMap;

use quilt_hash::TopHasher;
use serde_json::{Map, Value};

use crate::entry::Entry;
use crate::error::{ManifestError, ManifestResult};

/// The only manifest format version this crate reads and writes.
pub const MANIFEST_VERSION: &str = "v0";

/// An immutable package revision: header metadata plus sorted entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    metadata: Map<String, Value>,
    entries: BTreeMap<String, Entry>,
}

impl Manifest {
    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::new()
    }

    /// Header metadata, always carrying `version`.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Package-level user metadata, if any was attached.
    pub fn user_meta(&self) -> Option<&Value> {
        self.metadata.get("user_meta")
    }

    /// Entries in logical-key order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn entry(&self, logical_key: &str) -> Option<&Entry> {
        self.entries.get(logical_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every entry carries a content hash.
    pub fn is_fully_hashed(&self) -> bool {
        self.entries.values().all(Entry::is_hashed)
    }

    /// Compute the package's top hash.
    ///
    /// The canonical header is fed into a SHA-256 context, followed by one
    /// canonical `{hash, logical_key, meta, size}` row per entry in sorted
    /// order. Fails if any entry is unhashed.
    pub fn calculate_top_hash(&self) -> ManifestResult<String> {
        let mut top = TopHasher::new();
        top.update_json(&Value::Object(self.metadata.clone()))?;
        for (logical_key, entry) in &self.entries {
            top.update_json(&entry.hash_row(logical_key)?)?;
        }
        Ok(top.finalize_hex())
    }

    /// Start a builder seeded with this manifest's metadata and entries.
    pub fn to_builder(&self) -> ManifestBuilder {
        ManifestBuilder {
            metadata: self.metadata.clone(),
            entries: self.entries.clone(),
        }
    }
}

pub(crate) fn check_version(metadata: &Map<String, Value>) -> ManifestResult<()> {
    match metadata.get("version") {
        Some(Value::String(v)) if v == MANIFEST_VERSION => Ok(()),
        Some(other) => Err(ManifestError::UnsupportedVersion(other.to_string())),
        None => Err(ManifestError::UnsupportedVersion("<missing>".to_owned())),
    }
}

/// Accumulates entries and metadata, then freezes them into a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    metadata: Map<String, Value>,
    entries: BTreeMap<String, Entry>,
}

impl ManifestBuilder {
    /// A builder whose metadata is `{"version": "v0"}`.
    pub fn new() -> Self {
        let mut metadata = Map::new();
        metadata.insert("version".to_owned(), Value::from(MANIFEST_VERSION));
        Self {
            metadata,
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the entry at `logical_key`.
    pub fn add_entry(&mut self, logical_key: impl Into<String>, entry: Entry) -> &mut Self {
        self.entries.insert(logical_key.into(), entry);
        self
    }

    pub fn remove_entry(&mut self, logical_key: &str) -> Option<Entry> {
        self.entries.remove(logical_key)
    }

    /// Replace the whole header.
    pub fn set_metadata(&mut self, metadata: Map<String, Value>) -> &mut Self {
        self.metadata = metadata;
        self
    }

    /// Set one header field; `None` removes it.
    pub fn set_metadata_field(&mut self, key: &str, value: Option<Value>) -> &mut Self {
        match value {
            Some(value) => self.metadata.insert(key.to_owned(), value),
            None => self.metadata.remove(key),
        };
        self
    }

    pub fn set_user_meta(&mut self, user_meta: Option<Value>) -> &mut Self {
        self.set_metadata_field("user_meta", user_meta)
    }

    /// Freeze the builder. Fails unless the header declares version `v0`.
    pub fn build(&self) -> ManifestResult<Manifest> {
        check_version(&self.metadata)?;
        Ok(Manifest {
            metadata: self.metadata.clone(),
            entries: self.entries.clone(),
        })
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
