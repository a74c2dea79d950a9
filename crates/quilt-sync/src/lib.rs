//! Bulk transfer of Quilt packages.
//!
//! [`ManifestTransferExt`] adds two operations to
//! [`Manifest`](quilt_manifest::Manifest):
//!
//! - `push`: validate against the registry's workflow, hash every entry,
//!   upload the content under `<package>/<logical key>` in the destination
//!   bucket, store the new manifest and move the `latest` tag.
//! - `install`: download every entry of a remote manifest into a local
//!   directory, refusing logical keys that would land outside it.
//!
//! Transfers inside a batch run concurrently. A batch always waits for all
//! of its transfers before reporting the first failure; completed transfers
//! are never rolled back.

pub mod error;
pub mod install;
pub mod push;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use types::{InstallResult, PushResult, TransferConfig};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use quilt_manifest::Manifest;
use quilt_registry::Namespace;
use quilt_storage::ClientCache;

/// Push and install operations on a manifest.
#[async_trait]
pub trait ManifestTransferExt {
    /// Push this manifest into `namespace` and return the stored result.
    ///
    /// `workflow` names the workflow to validate against; `None` selects the
    /// configured default.
    async fn push(
        &self,
        namespace: &Namespace,
        message: Option<&str>,
        workflow: Option<&str>,
        config: &TransferConfig,
    ) -> SyncResult<PushResult>;

    /// Download every entry into `dest`.
    async fn install(
        &self,
        dest: &Path,
        clients: Arc<ClientCache>,
        config: &TransferConfig,
    ) -> SyncResult<InstallResult>;
}

#[async_trait]
impl ManifestTransferExt for Manifest {
    async fn push(
        &self,
        namespace: &Namespace,
        message: Option<&str>,
        workflow: Option<&str>,
        config: &TransferConfig,
    ) -> SyncResult<PushResult> {
        push::push(self, namespace, message, workflow, config).await
    }

    async fn install(
        &self,
        dest: &Path,
        clients: Arc<ClientCache>,
        config: &TransferConfig,
    ) -> SyncResult<InstallResult> {
        install::install(self, dest, clients, config).await
    }
}
