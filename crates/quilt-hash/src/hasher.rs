use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::{write_canonical, CanonicalError};

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental SHA-256 over blob content.
///
/// Content is fed in chunks as it is read so large objects never need to be
/// buffered whole.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes consumed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Finish the digest, returning it hex-encoded.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Running digest for a manifest's top hash.
///
/// The header and each entry row are canonicalized and fed into one SHA-256
/// context in order. Callers are responsible for feeding rows in sorted
/// logical-key order.
#[derive(Clone, Default)]
pub struct TopHasher {
    inner: Sha256,
    buf: String,
}

impl TopHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the canonical rendering of one JSON value into the digest.
    pub fn update_json(&mut self, value: &Value) -> Result<(), CanonicalError> {
        self.buf.clear();
        write_canonical(value, &mut self.buf)?;
        self.inner.update(self.buf.as_bytes());
        Ok(())
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
