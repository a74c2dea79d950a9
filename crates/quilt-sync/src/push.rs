//! Local → remote package push.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use quilt_manifest::{Entry, Manifest};
use quilt_registry::namespace::LATEST_TAG;
use quilt_registry::Namespace;
use quilt_storage::{ClientCache, PhysicalKey};
use quilt_workflow::WorkflowError;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::types::{PushResult, TransferConfig};

/// Validate, hash, upload, then store the manifest and move the tags.
///
/// Workflow validation happens before any content is read or written.
/// Tag writes follow the manifest write: `versions/<hash>`, the timestamp
/// tag, then `latest`.
pub async fn push(
    manifest: &Manifest,
    namespace: &Namespace,
    message: Option<&str>,
    workflow: Option<&str>,
    config: &TransferConfig,
) -> SyncResult<PushResult> {
    let registry = namespace.registry();
    let root = registry.root();
    if !root.is_remote() {
        return Err(SyncError::UnsupportedDestination(root.to_uri()));
    }
    let clients = Arc::clone(registry.clients());

    let workflow_data = validate_workflow(manifest, namespace, message, workflow).await?;

    let hashed = hash_entries(manifest, &clients, config).await?;

    let dest_dir = root.resolve(namespace.name())?;
    let uploaded = upload_entries(hashed, &dest_dir, &clients, config).await?;

    let mut builder = manifest.to_builder();
    let mut bytes_uploaded = 0;
    for (logical_key, entry) in &uploaded {
        bytes_uploaded += entry.size();
        builder.add_entry(logical_key.clone(), entry.clone());
    }
    builder
        .set_metadata_field("message", Some(message.map_or(Value::Null, Value::from)))
        .set_metadata_field("workflow", workflow_data);
    let pushed = builder.build()?;

    let top_hash = namespace.put_manifest(&pushed).await?;
    if config.tag_timestamp {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        namespace.set_tag(&timestamp, &top_hash).await?;
    }
    namespace.set_tag(LATEST_TAG, &top_hash).await?;

    tracing::info!(
        package = namespace.name(),
        %top_hash,
        entries = uploaded.len(),
        bytes = bytes_uploaded,
        "pushed package"
    );
    Ok(PushResult {
        manifest: pushed,
        top_hash,
        entries_uploaded: uploaded.len(),
        bytes_uploaded,
    })
}

/// Run the registry's workflow checks and return the provenance to store
/// under the `workflow` metadata key (`None` clears it).
async fn validate_workflow(
    manifest: &Manifest,
    namespace: &Namespace,
    message: Option<&str>,
    workflow: Option<&str>,
) -> SyncResult<Option<Value>> {
    let registry = namespace.registry();
    let Some(config) = registry.workflow_config().await? else {
        return match workflow {
            Some(name) => Err(WorkflowError::Violation(format!(
                "{name:?} workflow specified, but no workflows config exists"
            ))
            .into()),
            None => Ok(None),
        };
    };

    let validator = config.validator(workflow, registry.clients()).await?;
    validator.validate(
        namespace.name(),
        manifest.entries(),
        manifest.metadata(),
        message,
    )?;
    Ok(Some(validator.data_to_store()))
}

/// Hash every unhashed entry on the runtime's worker pool.
///
/// Every task is joined before the first failure is reported.
async fn hash_entries(
    manifest: &Manifest,
    clients: &Arc<ClientCache>,
    config: &TransferConfig,
) -> SyncResult<Vec<(String, Entry)>> {
    let results: Vec<_> = stream::iter(manifest.entries())
        .map(|(logical_key, entry)| {
            let logical_key = logical_key.to_owned();
            let entry = entry.clone();
            let clients = Arc::clone(clients);
            tokio::spawn(async move {
                let hashed = entry.with_hash(&clients).await;
                (logical_key, hashed)
            })
        })
        .boxed()
        .buffered(config.hash_limit())
        .collect()
        .await;

    let mut hashed = Vec::with_capacity(results.len());
    for result in results {
        let (logical_key, entry) = result?;
        hashed.push((logical_key, entry?));
    }
    Ok(hashed)
}

/// Copy each entry's content to `<dest_dir>/<logical key>`.
///
/// The returned entries point at the uploaded objects, pinned to the
/// version the backend assigned. Each in-flight upload holds its whole
/// body in memory, so at most `transfer_limit` bodies are buffered.
async fn upload_entries(
    entries: Vec<(String, Entry)>,
    dest_dir: &PhysicalKey,
    clients: &ClientCache,
    config: &TransferConfig,
) -> SyncResult<Vec<(String, Entry)>> {
    let results: Vec<SyncResult<(String, Entry)>> = stream::iter(entries)
        .map(|(logical_key, entry)| async move {
            let dest = dest_dir.resolve(&logical_key)?;
            let body = entry.physical_key().get_bytes(clients).await?;
            let written = dest.put_bytes(clients, body).await?;
            tracing::debug!(src = %entry.physical_key(), dest = %written, "uploaded entry");
            Ok::<_, SyncError>((logical_key, entry.with_physical_key(written)))
        })
        .buffered(config.transfer_limit())
        .collect()
        .await;

    results.into_iter().collect()
}
