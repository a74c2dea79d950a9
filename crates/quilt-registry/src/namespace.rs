//! Tag pointers and hash-prefix resolution for one package.

use std::fmt;

use bytes::Bytes;
use futures::TryStreamExt;
use quilt_manifest::Manifest;
use quilt_storage::{ClientCache, PhysicalKey};

use crate::error::{RegistryError, RegistryResult};
use crate::names::{is_top_hash, validate_tag_name, MIN_HASH_PREFIX_LEN, TOP_HASH_LEN};
use crate::registry::Registry;

/// Tag moved on every push.
pub const LATEST_TAG: &str = "latest";

/// One package's tag space plus the registry's shared version store.
#[derive(Clone)]
pub struct Namespace {
    registry: Registry,
    name: String,
    path: PhysicalKey,
    versions: PhysicalKey,
}

impl Namespace {
    pub(crate) fn new(registry: Registry, name: String, path: PhysicalKey) -> Self {
        let versions = registry.versions().clone();
        Self {
            registry,
            name,
            path,
            versions,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this package's tag pointers.
    pub fn path(&self) -> &PhysicalKey {
        &self.path
    }

    pub fn versions(&self) -> &PhysicalKey {
        &self.versions
    }

    fn clients(&self) -> &ClientCache {
        self.registry.clients()
    }

    pub fn tag_key(&self, tag: &str) -> RegistryResult<PhysicalKey> {
        validate_tag_name(tag)?;
        Ok(self.path.resolve(tag)?)
    }

    pub fn manifest_key(&self, top_hash: &str) -> RegistryResult<PhysicalKey> {
        Ok(self.versions.resolve(top_hash)?)
    }

    /// Read the tag pointer `tag` and return its content verbatim.
    ///
    /// The content is expected to be a 64-character top hash but is not
    /// checked here.
    pub async fn get_hash(&self, tag: &str) -> RegistryResult<String> {
        let key = self.tag_key(tag)?;
        let body = key.get_bytes(self.clients()).await.map_err(|e| {
            if e.is_not_found() {
                RegistryError::NotFound(format!("tag {tag:?} in package {}", self.name))
            } else {
                RegistryError::Storage(e)
            }
        })?;
        String::from_utf8(body.to_vec()).map_err(|e| RegistryError::InvalidPointer {
            tag: tag.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Expand a hash prefix to the unique full top hash it designates.
    ///
    /// A 64-character input is returned unchanged without a lookup. Shorter
    /// inputs of at least six characters are matched against every stored
    /// manifest name.
    pub async fn resolve_hash(&self, prefix: &str) -> RegistryResult<String> {
        let len = prefix.chars().count();
        if len == TOP_HASH_LEN {
            if !is_top_hash(prefix) {
                return Err(RegistryError::InvalidArgument(format!(
                    "{prefix:?} is not a lowercase hex top hash"
                )));
            }
            return Ok(prefix.to_owned());
        }
        if !(MIN_HASH_PREFIX_LEN..TOP_HASH_LEN).contains(&len) {
            return Err(RegistryError::InvalidArgument(format!(
                "hash prefix must be {MIN_HASH_PREFIX_LEN} to {TOP_HASH_LEN} characters, got {len}"
            )));
        }

        let mut matches: Vec<String> = self
            .versions
            .list_recursively(self.clients())
            .try_filter(|name| futures::future::ready(name.starts_with(prefix)))
            .try_collect()
            .await?;
        match matches.len() {
            0 => Err(RegistryError::NotFound(format!("no manifest with hash prefix {prefix:?}"))),
            1 => Ok(matches.remove(0)),
            n => Err(RegistryError::Ambiguous {
                prefix: prefix.to_owned(),
                matches: n,
            }),
        }
    }

    /// Load the manifest identified by a full hash or a unique prefix.
    pub async fn get_manifest(&self, hash_or_prefix: &str) -> RegistryResult<Manifest> {
        let top_hash = self.resolve_hash(hash_or_prefix).await?;
        let key = self.manifest_key(&top_hash)?;
        tracing::debug!(package = %self.name, %top_hash, "loading manifest");
        match Manifest::create_from_file(&key, self.clients()).await {
            Err(quilt_manifest::ManifestError::Storage(e)) if e.is_not_found() => Err(
                RegistryError::NotFound(format!("manifest {top_hash} in package {}", self.name)),
            ),
            other => Ok(other?),
        }
    }

    /// Load the manifest a tag points at.
    pub async fn get_tagged_manifest(&self, tag: &str) -> RegistryResult<Manifest> {
        let top_hash = self.get_hash(tag).await?;
        self.get_manifest(top_hash.trim()).await
    }

    /// Every tag of this package, sorted.
    pub async fn list_tags(&self) -> RegistryResult<Vec<String>> {
        let mut tags: Vec<String> = self
            .path
            .list_recursively(self.clients())
            .try_filter(|name| futures::future::ready(!name.contains('/')))
            .try_collect()
            .await?;
        tags.sort();
        Ok(tags)
    }

    /// Point `tag` at `top_hash`.
    pub async fn set_tag(&self, tag: &str, top_hash: &str) -> RegistryResult<()> {
        let key = self.tag_key(tag)?;
        key.put_bytes(self.clients(), Bytes::from(top_hash.to_owned()))
            .await?;
        tracing::debug!(package = %self.name, tag, top_hash, "tag updated");
        Ok(())
    }

    /// Store `manifest` under its top hash and return the hash.
    pub async fn put_manifest(&self, manifest: &Manifest) -> RegistryResult<String> {
        let top_hash = manifest.calculate_top_hash()?;
        let key = self.manifest_key(&top_hash)?;
        key.put_bytes(self.clients(), Bytes::from(manifest.serialize()?))
            .await?;
        Ok(top_hash)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("versions", &self.versions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quilt_manifest::{Entry, Hash};
    use quilt_storage::{InMemoryBlobStore, InMemoryProvider};

    use super::*;

    const HASH_ONE: &str = "abcdef1000000000000000000000000000000000000000000000000000000000";
    const HASH_TWO: &str = "abcdef2000000000000000000000000000000000000000000000000000000000";

    fn local_namespace() -> (tempfile::TempDir, Namespace) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(
            PhysicalKey::local(dir.path()).unwrap(),
            Arc::new(ClientCache::local_only()),
        )
        .unwrap();
        let ns = registry.namespace("test/test").unwrap();
        (dir, ns)
    }

    fn memory_namespace(page_size: usize) -> Namespace {
        let store = Arc::new(InMemoryBlobStore::with_page_size(page_size));
        store.create_bucket("bkt");
        let clients = ClientCache::new(Arc::new(InMemoryProvider::new(store, "us-east-1")));
        let registry = Registry::new(PhysicalKey::from_uri("s3://bkt/").unwrap(), Arc::new(clients)).unwrap();
        registry.namespace("test/test").unwrap()
    }

    async fn store_versions(ns: &Namespace, hashes: &[&str]) {
        for hash in hashes {
            ns.manifest_key(hash)
                .unwrap()
                .put_bytes(ns.clients(), Bytes::from_static(b"{\"version\": \"v0\"}\n"))
                .await
                .unwrap();
        }
    }

    fn sample_manifest(dir: &std::path::Path) -> Manifest {
        let key = PhysicalKey::local(dir.join("foo.txt")).unwrap();
        let entry = Entry::new(
            key,
            5,
            Some(Hash::sha256("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")),
            None,
        );
        Manifest::builder().add_entry("foo.txt", entry).build().unwrap()
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_hash_returns_pointer_content() {
        let (_dir, ns) = local_namespace();
        ns.set_tag("latest", HASH_ONE).await.unwrap();
        assert_eq!(ns.get_hash("latest").await.unwrap(), HASH_ONE);
    }

    #[tokio::test]
    async fn missing_tag_is_not_found() {
        let (_dir, ns) = local_namespace();
        assert!(matches!(ns.get_hash("latest").await, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_tag_is_rejected_before_io() {
        let (_dir, ns) = local_namespace();
        assert!(matches!(
            ns.get_hash("../escape").await,
            Err(RegistryError::InvalidTagName { .. })
        ));
    }

    #[tokio::test]
    async fn list_tags_is_sorted() {
        let ns = memory_namespace(1);
        for tag in ["latest", "1700000001", "1700000000"] {
            ns.set_tag(tag, HASH_ONE).await.unwrap();
        }
        assert_eq!(ns.list_tags().await.unwrap(), vec!["1700000000", "1700000001", "latest"]);
    }

    // -----------------------------------------------------------------------
    // Hash resolution
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn ambiguous_prefix() {
        let (_dir, ns) = local_namespace();
        store_versions(&ns, &[HASH_ONE, HASH_TWO]).await;

        match ns.resolve_hash("abcdef").await {
            Err(RegistryError::Ambiguous { prefix, matches }) => {
                assert_eq!(prefix, "abcdef");
                assert_eq!(matches, 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unique_prefix_resolves() {
        let (_dir, ns) = local_namespace();
        store_versions(&ns, &[HASH_ONE, HASH_TWO]).await;
        assert_eq!(ns.resolve_hash("abcdef2").await.unwrap(), HASH_TWO);
    }

    #[tokio::test]
    async fn unique_prefix_resolves_across_pages() {
        let ns = memory_namespace(1);
        store_versions(&ns, &[HASH_ONE, HASH_TWO]).await;
        assert_eq!(ns.resolve_hash("abcdef1").await.unwrap(), HASH_ONE);
    }

    #[tokio::test]
    async fn unknown_prefix_is_not_found() {
        let (_dir, ns) = local_namespace();
        store_versions(&ns, &[HASH_ONE]).await;
        assert!(matches!(ns.resolve_hash("012345").await, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn full_hash_is_returned_without_lookup() {
        let (_dir, ns) = local_namespace();
        let full = "f".repeat(64);
        assert_eq!(ns.resolve_hash(&full).await.unwrap(), full);
    }

    #[tokio::test]
    async fn full_length_non_hash_is_invalid() {
        let (_dir, ns) = local_namespace();
        let traversal = format!("../../{}", "a".repeat(58));
        for candidate in [traversal, "A".repeat(64), "g".repeat(64)] {
            assert!(matches!(
                ns.resolve_hash(&candidate).await,
                Err(RegistryError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn short_prefix_is_invalid() {
        let (_dir, ns) = local_namespace();
        assert!(matches!(ns.resolve_hash("abc").await, Err(RegistryError::InvalidArgument(_))));
        assert!(matches!(
            ns.resolve_hash(&"a".repeat(65)).await,
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Manifests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_then_get_by_prefix_and_tag() {
        let (dir, ns) = local_namespace();
        let manifest = sample_manifest(dir.path());
        let top_hash = ns.put_manifest(&manifest).await.unwrap();
        assert_eq!(top_hash, manifest.calculate_top_hash().unwrap());
        ns.set_tag(LATEST_TAG, &top_hash).await.unwrap();

        let by_prefix = ns.get_manifest(&top_hash[..8]).await.unwrap();
        assert_eq!(by_prefix.calculate_top_hash().unwrap(), top_hash);
        let by_tag = ns.get_tagged_manifest(LATEST_TAG).await.unwrap();
        assert_eq!(by_tag.entry("foo.txt").unwrap().size(), 5);
    }

    #[tokio::test]
    async fn missing_full_hash_is_not_found() {
        let (_dir, ns) = local_namespace();
        assert!(matches!(
            ns.get_manifest(&"0".repeat(64)).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
