use std::path::PathBuf;

use crate::blob::BlobError;

/// Errors from physical-key parsing and blob I/O.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The URI scheme has no backend.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    /// The URI is malformed for its scheme.
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The operation is not valid for this key.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// No blob exists at the given location.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote backend call failed.
    #[error("backend error for {uri}: {source}")]
    Backend {
        uri: String,
        #[source]
        source: BlobError,
    },

    /// Local filesystem I/O failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return StorageError::NotFound(path.display().to_string());
        }
        StorageError::Io { path, source }
    }

    pub(crate) fn backend(uri: impl Into<String>, source: BlobError) -> Self {
        let uri = uri.into();
        match source {
            BlobError::NoSuchKey => StorageError::NotFound(uri),
            source => StorageError::Backend { uri, source },
        }
    }

    /// Whether this error means the addressed blob does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
