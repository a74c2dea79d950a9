use std::path::PathBuf;

use quilt_manifest::ManifestError;
use quilt_registry::RegistryError;
use quilt_storage::StorageError;
use quilt_workflow::WorkflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("logical key {logical_key:?} resolves outside of {dest}")]
    PathEscape { logical_key: String, dest: PathBuf },

    #[error("expected remote physical keys, but entry {0:?} is local")]
    ExpectedRemoteKeys(String),

    #[error("unsupported push destination {0}: only remote registries are supported")]
    UnsupportedDestination(String),

    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SyncResult<T> = Result<T, SyncError>;
