use quilt_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    #[error("entry {0:?} has no content hash")]
    UnhashedEntry(String),

    #[error("unknown hash type: {0}")]
    InvalidHashType(String),

    #[error("malformed manifest at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("read failed for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonicalization failed: {0}")]
    Canonical(#[from] quilt_hash::CanonicalError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ManifestResult<T> = Result<T, ManifestError>;
