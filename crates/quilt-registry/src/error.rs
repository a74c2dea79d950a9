//! Error types for registry operations.

use quilt_manifest::ManifestError;
use quilt_storage::StorageError;
use quilt_workflow::WorkflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tag, hash prefix or manifest does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A hash prefix matches more than one stored manifest.
    #[error("hash prefix {prefix:?} is ambiguous ({matches} matches)")]
    Ambiguous { prefix: String, matches: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid package name {name:?}: {reason}")]
    InvalidPackageName { name: String, reason: String },

    #[error("invalid tag name {name:?}: {reason}")]
    InvalidTagName { name: String, reason: String },

    #[error("invalid package URI {uri:?}: {reason}")]
    InvalidPackageUri { uri: String, reason: String },

    /// A tag pointer blob is not valid UTF-8.
    #[error("corrupt tag pointer {tag:?}: {reason}")]
    InvalidPointer { tag: String, reason: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Convenience type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
