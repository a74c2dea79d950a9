use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use quilt_hash::ContentHasher;
use quilt_storage::{ClientCache, PhysicalKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::AsyncReadExt;

use crate::error::{ManifestError, ManifestResult};

const READ_CHUNK: usize = 64 * 1024;

/// Content-hash algorithms recognized in manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashType {
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "sha2-256-chunked")]
    Sha2_256Chunked,
}

impl HashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashType::Sha256 => "SHA256",
            HashType::Sha2_256Chunked => "sha2-256-chunked",
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA256" => Ok(HashType::Sha256),
            "sha2-256-chunked" => Ok(HashType::Sha2_256Chunked),
            other => Err(ManifestError::InvalidHashType(other.to_owned())),
        }
    }
}

/// A typed, hex-encoded content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash {
    #[serde(rename = "type")]
    pub hash_type: HashType,
    pub value: String,
}

impl Hash {
    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            hash_type: HashType::Sha256,
            value: value.into(),
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        json!({"type": self.hash_type.as_str(), "value": self.value})
    }
}

/// One logical file in a package.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    physical_key: PhysicalKey,
    size: u64,
    hash: Option<Hash>,
    meta: Map<String, Value>,
}

impl Entry {
    pub fn new(
        physical_key: PhysicalKey,
        size: u64,
        hash: Option<Hash>,
        meta: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            physical_key,
            size,
            hash,
            meta: meta.unwrap_or_default(),
        }
    }

    pub fn physical_key(&self) -> &PhysicalKey {
        &self.physical_key
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hash(&self) -> Option<&Hash> {
        self.hash.as_ref()
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn is_hashed(&self) -> bool {
        self.hash.is_some()
    }

    /// The same entry, relocated to `physical_key`.
    pub fn with_physical_key(&self, physical_key: PhysicalKey) -> Self {
        Self {
            physical_key,
            ..self.clone()
        }
    }

    /// Return this entry with its SHA-256 computed.
    ///
    /// Already-hashed entries are returned unchanged. Content is streamed in
    /// chunks; size and location are never modified.
    pub async fn with_hash(self, clients: &ClientCache) -> ManifestResult<Entry> {
        if self.hash.is_some() {
            return Ok(self);
        }
        let (mut reader, _) = self.physical_key.open(clients).await?;
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf).await.map_err(|source| ManifestError::Read {
                key: self.physical_key.to_uri(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        tracing::debug!(key = %self.physical_key, bytes = hasher.bytes_hashed(), "hashed entry");
        Ok(Entry {
            hash: Some(Hash::sha256(hasher.finalize_hex())),
            ..self
        })
    }

    pub async fn get_bytes(&self, clients: &ClientCache) -> ManifestResult<Bytes> {
        Ok(self.physical_key.get_bytes(clients).await?)
    }

    /// The row fed into the top-hash digest for this entry.
    pub(crate) fn hash_row(&self, logical_key: &str) -> ManifestResult<Value> {
        let hash = self
            .hash
            .as_ref()
            .ok_or_else(|| ManifestError::UnhashedEntry(logical_key.to_owned()))?;
        Ok(json!({
            "hash": hash.to_json(),
            "logical_key": logical_key,
            "meta": Value::Object(self.meta.clone()),
            "size": self.size,
        }))
    }
}
