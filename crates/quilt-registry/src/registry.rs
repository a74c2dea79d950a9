//! The registry root and its three sub-trees.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::TryStreamExt;
use quilt_storage::{ClientCache, PhysicalKey};
use quilt_workflow::WorkflowConfig;

use crate::error::RegistryResult;
use crate::names::validate_package_name;
use crate::namespace::Namespace;

const NAMES_DIR: &str = ".quilt/named_packages";
const VERSIONS_DIR: &str = ".quilt/packages";
const WORKFLOW_CONFIG: &str = ".quilt/workflows/config.yml";

/// A package registry rooted at a local directory or a bucket prefix.
///
/// Holds only locators plus the shared [`ClientCache`]; cloning is cheap.
#[derive(Clone)]
pub struct Registry {
    root: PhysicalKey,
    names: PhysicalKey,
    versions: PhysicalKey,
    workflow_config: PhysicalKey,
    clients: Arc<ClientCache>,
}

impl Registry {
    pub fn new(root: PhysicalKey, clients: Arc<ClientCache>) -> RegistryResult<Self> {
        tracing::info!(root = %root, "opening registry");
        Ok(Self {
            names: root.resolve(NAMES_DIR)?,
            versions: root.resolve(VERSIONS_DIR)?,
            workflow_config: root.resolve(WORKFLOW_CONFIG)?,
            root,
            clients,
        })
    }

    pub fn root(&self) -> &PhysicalKey {
        &self.root
    }

    /// Directory of tag pointers, one sub-directory per package.
    pub fn names(&self) -> &PhysicalKey {
        &self.names
    }

    /// Directory of manifests, one blob per top hash.
    pub fn versions(&self) -> &PhysicalKey {
        &self.versions
    }

    pub fn workflow_config_key(&self) -> &PhysicalKey {
        &self.workflow_config
    }

    pub fn clients(&self) -> &Arc<ClientCache> {
        &self.clients
    }

    /// The namespace for package `name`. Fails if the name is malformed.
    pub fn namespace(&self, name: &str) -> RegistryResult<Namespace> {
        validate_package_name(name)?;
        tracing::debug!(name, "opening namespace");
        let path = self.names.resolve(name)?;
        Ok(Namespace::new(self.clone(), name.to_owned(), path))
    }

    /// Load `.quilt/workflows/config.yml`, or `None` when the registry has
    /// no workflow configuration.
    pub async fn workflow_config(&self) -> RegistryResult<Option<WorkflowConfig>> {
        Ok(WorkflowConfig::load(&self.workflow_config, &self.clients).await?)
    }

    /// Names of every package with at least one tag, sorted.
    pub async fn list_packages(&self) -> RegistryResult<Vec<String>> {
        let tags: Vec<String> = self
            .names
            .list_recursively(&self.clients)
            .try_collect()
            .await?;
        let packages: BTreeSet<String> = tags
            .iter()
            .filter_map(|path| {
                let mut parts = path.splitn(3, '/');
                let (prefix, suffix, _tag) = (parts.next()?, parts.next()?, parts.next()?);
                Some(format!("{prefix}/{suffix}"))
            })
            .filter(|name| validate_package_name(name).is_ok())
            .collect();
        Ok(packages.into_iter().collect())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("root", &self.root).finish()
    }
}

/// Open the namespace `name` of the registry rooted at `uri`.
///
/// The URI is treated as a directory whether or not it ends in `/`.
pub fn create_namespace_at_uri(
    name: &str,
    uri: &str,
    clients: Arc<ClientCache>,
) -> RegistryResult<Namespace> {
    let uri = if uri.ends_with('/') {
        uri.to_owned()
    } else {
        format!("{uri}/")
    };
    Registry::new(PhysicalKey::from_uri(&uri)?, clients)?.namespace(name)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use quilt_storage::{InMemoryBlobStore, InMemoryProvider};

    use super::*;
    use crate::error::RegistryError;

    fn memory_registry() -> (Arc<InMemoryBlobStore>, Registry) {
        let store = Arc::new(InMemoryBlobStore::new());
        store.create_bucket("bkt");
        let clients = ClientCache::new(Arc::new(InMemoryProvider::new(Arc::clone(&store), "us-east-1")));
        let root = PhysicalKey::from_uri("s3://bkt/").unwrap();
        (store, Registry::new(root, Arc::new(clients)).unwrap())
    }

    #[test]
    fn layout_under_remote_root() {
        let (_, registry) = memory_registry();
        assert_eq!(registry.names().to_uri(), "s3://bkt/.quilt/named_packages");
        assert_eq!(registry.versions().to_uri(), "s3://bkt/.quilt/packages");
        assert_eq!(
            registry.workflow_config_key().to_uri(),
            "s3://bkt/.quilt/workflows/config.yml"
        );
    }

    #[test]
    fn layout_under_local_root() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(
            PhysicalKey::local(dir.path()).unwrap(),
            Arc::new(ClientCache::local_only()),
        )
        .unwrap();
        assert_eq!(
            registry.versions(),
            &PhysicalKey::local(dir.path().join(".quilt/packages")).unwrap()
        );
    }

    #[test]
    fn namespace_rejects_bad_names() {
        let (_, registry) = memory_registry();
        assert!(registry.namespace("test/test").is_ok());
        assert!(matches!(
            registry.namespace("no-slash"),
            Err(RegistryError::InvalidPackageName { .. })
        ));
    }

    #[test]
    fn create_namespace_at_uri_appends_slash() {
        let dir = tempfile::tempdir().unwrap();
        let uri = PhysicalKey::local(dir.path()).unwrap().to_uri();
        let ns = create_namespace_at_uri("test/test", &uri, Arc::new(ClientCache::local_only())).unwrap();
        assert_eq!(
            ns.path(),
            &PhysicalKey::local(dir.path().join(".quilt/named_packages/test/test")).unwrap()
        );
    }

    #[test]
    fn create_namespace_at_uri_rejects_unknown_scheme() {
        let result = create_namespace_at_uri("a/b", "gs://bkt", Arc::new(ClientCache::local_only()));
        assert!(matches!(result, Err(RegistryError::Storage(_))));
    }

    #[tokio::test]
    async fn missing_workflow_config_is_none() {
        let (_, registry) = memory_registry();
        assert!(registry.workflow_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workflow_config_is_loaded_from_registry() {
        let (store, registry) = memory_registry();
        let yaml = "version: \"1\"\nis_workflow_required: false\nworkflows:\n  alpha:\n    name: Alpha\n";
        quilt_storage::BlobStore::put_object(
            store.as_ref(),
            "bkt",
            ".quilt/workflows/config.yml",
            Bytes::from(yaml),
        )
        .await
        .unwrap();

        let config = registry.workflow_config().await.unwrap().unwrap();
        assert_eq!(config.workflow_names().collect::<Vec<_>>(), vec!["alpha"]);
        assert!(!config.is_workflow_required());
    }

    #[tokio::test]
    async fn list_packages_groups_tags_by_package() {
        let (_, registry) = memory_registry();
        let hash = "a".repeat(64);
        for (name, tag) in [("b/two", "latest"), ("a/one", "latest"), ("a/one", "1700000000")] {
            registry.namespace(name).unwrap().set_tag(tag, &hash).await.unwrap();
        }
        assert_eq!(registry.list_packages().await.unwrap(), vec!["a/one", "b/two"]);
    }
}
