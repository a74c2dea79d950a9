use quilt_storage::StorageError;
use thiserror::Error;

use crate::version::ConfigDataVersion;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflows config or one of its schemas is unusable.
    #[error("workflow configuration error: {0}")]
    Configuration(String),

    /// The package does not satisfy the selected workflow.
    #[error("workflow violation: {0}")]
    Violation(String),

    #[error("workflow config version {found} is newer than supported {supported}")]
    UnsupportedVersion {
        found: ConfigDataVersion,
        supported: ConfigDataVersion,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
