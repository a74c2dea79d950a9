use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use quilt_storage::{ClientCache, PhysicalKey};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;

use crate::error::{WorkflowError, WorkflowResult};
use crate::schema::{check_config_document, LoadedSchema};
use crate::validator::WorkflowValidator;
use crate::version::{ConfigDataVersion, SUPPORTED_CONFIG_VERSION};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VersionField {
    Plain(String),
    Detailed { base: String },
}

impl VersionField {
    fn base(&self) -> &str {
        match self {
            VersionField::Plain(v) => v,
            VersionField::Detailed { base } => base,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigDocument {
    version: VersionField,
    #[serde(default)]
    default_workflow: Option<String>,
    #[serde(default = "default_true")]
    is_workflow_required: bool,
    #[serde(default)]
    workflows: BTreeMap<String, WorkflowSpec>,
    #[serde(default)]
    schemas: BTreeMap<String, SchemaRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WorkflowSpec {
    #[serde(default)]
    handle_pattern: Option<String>,
    #[serde(default)]
    metadata_schema: Option<String>,
    #[serde(default)]
    entries_schema: Option<String>,
    #[serde(default)]
    is_message_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaRef {
    url: String,
}

/// A registry's parsed workflows configuration.
///
/// Schemas referenced by workflows are fetched lazily and cached both by
/// schema id and by location, so two ids pointing at the same document
/// share one compiled validator.
pub struct WorkflowConfig {
    document: ConfigDocument,
    location: PhysicalKey,
    version: ConfigDataVersion,
    schemas_by_id: DashMap<String, Arc<LoadedSchema>>,
    schemas_by_location: DashMap<String, Arc<LoadedSchema>>,
}

impl WorkflowConfig {
    /// Load the config at `key`.
    ///
    /// Returns `Ok(None)` when the blob does not exist or is empty.
    pub async fn load(key: &PhysicalKey, clients: &ClientCache) -> WorkflowResult<Option<Self>> {
        tracing::info!(config = %key, "loading workflows config");
        let (data, effective) = match read_blob(key, clients).await {
            Ok(found) => found,
            Err(WorkflowError::Storage(e)) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if data.is_empty() {
            return Ok(None);
        }
        Self::from_yaml(&data, effective).map(Some)
    }

    /// Parse and validate config YAML read from `location`.
    pub fn from_yaml(data: &[u8], location: PhysicalKey) -> WorkflowResult<Self> {
        let raw: Value = serde_yaml::from_slice(data).map_err(|e| {
            WorkflowError::Configuration(format!("couldn't parse workflows config as YAML: {e}"))
        })?;
        check_config_document(&raw)?;
        let document: ConfigDocument = serde_json::from_value(raw).map_err(|e| {
            WorkflowError::Configuration(format!("unexpected workflows config shape: {e}"))
        })?;

        let version: ConfigDataVersion = document.version.base().parse()?;
        if version > SUPPORTED_CONFIG_VERSION {
            return Err(WorkflowError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_CONFIG_VERSION,
            });
        }

        Ok(Self {
            document,
            location,
            version,
            schemas_by_id: DashMap::new(),
            schemas_by_location: DashMap::new(),
        })
    }

    pub fn location(&self) -> &PhysicalKey {
        &self.location
    }

    pub fn version(&self) -> ConfigDataVersion {
        self.version
    }

    pub fn default_workflow(&self) -> Option<&str> {
        self.document.default_workflow.as_deref()
    }

    pub fn is_workflow_required(&self) -> bool {
        self.document.is_workflow_required
    }

    /// Names of all configured workflows, sorted.
    pub fn workflow_names(&self) -> impl Iterator<Item = &str> {
        self.document.workflows.keys().map(String::as_str)
    }

    /// Build the validator for `workflow`.
    ///
    /// `None` selects the default workflow. An empty selection (no name and
    /// no default) is allowed only when the config does not require a
    /// workflow.
    pub async fn validator(
        &self,
        workflow: Option<&str>,
        clients: &ClientCache,
    ) -> WorkflowResult<WorkflowValidator> {
        let name = workflow
            .or(self.document.default_workflow.as_deref())
            .unwrap_or("");

        let definition = if name.is_empty() {
            if self.document.is_workflow_required {
                return Err(WorkflowError::Violation(
                    "workflow required, but none specified".to_owned(),
                ));
            }
            WorkflowSpec::default()
        } else {
            self.document.workflows.get(name).cloned().ok_or_else(|| {
                WorkflowError::Violation(format!("there is no {name:?} workflow in config"))
            })?
        };

        let name_pattern = definition
            .handle_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| WorkflowError::Configuration(format!("invalid handle_pattern: {e}")))?;

        let mut used = Map::new();
        let metadata_schema = match definition.metadata_schema.as_deref() {
            Some(id) => Some(self.schema(id, clients, &mut used).await?),
            None => None,
        };
        let entries_schema = match definition.entries_schema.as_deref() {
            Some(id) => Some(self.schema(id, clients, &mut used).await?),
            None => None,
        };

        let mut data_to_store = Map::new();
        let id = if name.is_empty() {
            Value::Null
        } else {
            Value::from(name)
        };
        data_to_store.insert("id".to_owned(), id);
        data_to_store.insert("config".to_owned(), Value::from(self.location.to_uri()));
        if !used.is_empty() {
            data_to_store.insert("schemas".to_owned(), Value::Object(used));
        }
        tracing::debug!(workflow = %name, "built workflow validator");

        Ok(WorkflowValidator::new(
            Value::Object(data_to_store),
            definition.is_message_required,
            name_pattern,
            metadata_schema,
            entries_schema,
        ))
    }

    async fn schema(
        &self,
        id: &str,
        clients: &ClientCache,
        used: &mut Map<String, Value>,
    ) -> WorkflowResult<Arc<LoadedSchema>> {
        let schema = self.load_schema(id, clients).await?;
        used.insert(id.to_owned(), Value::from(schema.location().to_uri()));
        Ok(schema)
    }

    async fn load_schema(&self, id: &str, clients: &ClientCache) -> WorkflowResult<Arc<LoadedSchema>> {
        if let Some(hit) = self.schemas_by_id.get(id).map(|s| Arc::clone(s.value())) {
            return Ok(hit);
        }

        let key = self.schema_key(id)?;
        let key_uri = key.to_uri();
        if let Some(hit) = self.schemas_by_location.get(&key_uri).map(|s| Arc::clone(s.value())) {
            self.schemas_by_id.insert(id.to_owned(), Arc::clone(&hit));
            return Ok(hit);
        }

        tracing::info!(schema = %key, "loading schema");
        let (data, effective) = read_blob(&key, clients).await.map_err(|e| {
            WorkflowError::Configuration(format!("couldn't load schema at {key}: {e}"))
        })?;
        let document: Value = serde_json::from_slice(&data).map_err(|e| {
            WorkflowError::Configuration(format!("couldn't parse {key} as JSON: {e}"))
        })?;
        let loaded = Arc::new(LoadedSchema::compile(&document, effective)?);

        self.schemas_by_id.insert(id.to_owned(), Arc::clone(&loaded));
        self.schemas_by_location.insert(key_uri, Arc::clone(&loaded));
        Ok(loaded)
    }

    fn schema_key(&self, id: &str) -> WorkflowResult<PhysicalKey> {
        let reference = self.document.schemas.get(id).ok_or_else(|| {
            WorkflowError::Configuration(format!("there is no {id:?} in schemas"))
        })?;
        let key = PhysicalKey::from_uri(&reference.url).map_err(|e| {
            WorkflowError::Configuration(format!("couldn't parse URL {:?}: {e}", reference.url))
        })?;
        if key.is_local() && !self.location.is_local() {
            return Err(WorkflowError::Configuration(format!(
                "local schema {key} can't be used on the remote registry"
            )));
        }
        Ok(key)
    }
}

impl std::fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("location", &self.location.to_uri())
            .field("version", &self.version)
            .field("workflows", &self.document.workflows.len())
            .finish()
    }
}

async fn read_blob(key: &PhysicalKey, clients: &ClientCache) -> WorkflowResult<(Vec<u8>, PhysicalKey)> {
    let (mut reader, effective) = key.open(clients).await?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .await
        .map_err(|e| WorkflowError::Configuration(format!("couldn't read {key}: {e}")))?;
    Ok((data, effective))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use quilt_storage::{InMemoryBlobStore, InMemoryProvider};

    use super::*;

    const CONFIG: &str = r#"
version: "1"
default_workflow: alpha
workflows:
  alpha:
    name: Alpha
    handle_pattern: ^team/
    is_message_required: true
    metadata_schema: top
    entries_schema: files
  beta:
    name: Beta
    metadata_schema: top-alias
schemas:
  top:
    url: s3://bkt/schemas/top.json
  top-alias:
    url: s3://bkt/schemas/top.json
  files:
    url: s3://bkt/schemas/files.json
  local:
    url: file:///tmp/schema.json
"#;

    async fn put(clients: &ClientCache, key: &str, body: &'static str) {
        PhysicalKey::remote("bkt", key, None)
            .put_bytes(clients, Bytes::from_static(body.as_bytes()))
            .await
            .unwrap();
    }

    async fn remote_setup() -> (Arc<InMemoryBlobStore>, ClientCache) {
        let store = Arc::new(InMemoryBlobStore::new());
        store.create_bucket("bkt");
        let clients = ClientCache::new(Arc::new(InMemoryProvider::new(Arc::clone(&store), "us-east-1")));
        put(&clients, ".quilt/workflows/config.yml", CONFIG).await;
        put(
            &clients,
            "schemas/top.json",
            r#"{"$schema": "http://json-schema.org/draft-07/schema#", "type": "object", "required": ["owner"]}"#,
        )
        .await;
        put(&clients, "schemas/files.json", r#"{"type": "array", "maxItems": 2}"#).await;
        (store, clients)
    }

    fn config_key() -> PhysicalKey {
        PhysicalKey::remote("bkt", ".quilt/workflows/config.yml", None)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn load_pins_config_version() {
        let (_store, clients) = remote_setup().await;
        let config = WorkflowConfig::load(&config_key(), &clients).await.unwrap().unwrap();
        assert!(config.location().version_id().is_some());
        assert_eq!(config.default_workflow(), Some("alpha"));
        assert!(config.is_workflow_required());
        assert_eq!(config.workflow_names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert_eq!(config.version(), ConfigDataVersion::new(1, 0, 0));
    }

    #[tokio::test]
    async fn missing_or_empty_config_is_none() {
        let (_store, clients) = remote_setup().await;
        let absent = PhysicalKey::remote("bkt", "nope.yml", None);
        assert!(WorkflowConfig::load(&absent, &clients).await.unwrap().is_none());

        let empty = PhysicalKey::remote("bkt", "empty.yml", None);
        empty.put_bytes(&clients, Bytes::new()).await.unwrap();
        assert!(WorkflowConfig::load(&empty, &clients).await.unwrap().is_none());
    }

    #[test]
    fn newer_version_is_rejected() {
        let yaml = b"version: {base: \"1.2\"}\nworkflows: {}\n";
        let err = WorkflowConfig::from_yaml(yaml, config_key()).unwrap_err();
        assert!(matches!(err, WorkflowError::UnsupportedVersion { .. }));

        let yaml = b"version: \"1.1.0\"\nworkflows: {}\n";
        assert!(WorkflowConfig::from_yaml(yaml, config_key()).is_ok());
    }

    #[test]
    fn invalid_documents_are_configuration_errors() {
        for yaml in ["version: [1\n", "workflows: {}\n", "version: \"1\"\nworkflows: {a: {bogus: 1}}\n"] {
            let err = WorkflowConfig::from_yaml(yaml.as_bytes(), config_key()).unwrap_err();
            assert!(matches!(err, WorkflowError::Configuration(_)), "{yaml:?}");
        }
    }

    // -----------------------------------------------------------------------
    // Validator selection
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn default_workflow_is_selected() {
        let (_store, clients) = remote_setup().await;
        let config = WorkflowConfig::load(&config_key(), &clients).await.unwrap().unwrap();
        let validator = config.validator(None, &clients).await.unwrap();
        let data = validator.data_to_store();
        assert_eq!(data["id"], "alpha");
        assert_eq!(data["config"], Value::from(config.location().to_uri()));
        let schemas = data["schemas"].as_object().unwrap();
        assert_eq!(schemas.len(), 2);
        assert!(schemas["top"].as_str().unwrap().starts_with("s3://bkt/schemas/top.json?versionId="));
    }

    #[tokio::test]
    async fn unknown_workflow_is_a_violation() {
        let (_store, clients) = remote_setup().await;
        let config = WorkflowConfig::load(&config_key(), &clients).await.unwrap().unwrap();
        assert!(matches!(
            config.validator(Some("gamma"), &clients).await,
            Err(WorkflowError::Violation(_))
        ));
    }

    #[tokio::test]
    async fn schemas_are_cached_by_location() {
        let (store, clients) = remote_setup().await;
        let config = WorkflowConfig::load(&config_key(), &clients).await.unwrap().unwrap();
        config.validator(Some("alpha"), &clients).await.unwrap();

        // Overwrite the schema: the alias must still resolve to the cached copy.
        PhysicalKey::remote("bkt", "schemas/top.json", None)
            .put_bytes(&clients, Bytes::from_static(b"not json"))
            .await
            .unwrap();
        assert_eq!(store.version_count("bkt", "schemas/top.json"), 2);
        let beta = config.validator(Some("beta"), &clients).await.unwrap();
        assert_eq!(beta.data_to_store()["id"], "beta");
    }

    #[tokio::test]
    async fn no_workflow_when_not_required() {
        let yaml = b"version: \"1\"\nis_workflow_required: false\nworkflows: {}\n";
        let config = WorkflowConfig::from_yaml(yaml, config_key()).unwrap();
        let clients = ClientCache::local_only();
        let validator = config.validator(None, &clients).await.unwrap();
        assert!(validator.data_to_store()["id"].is_null());
        assert!(validator.data_to_store().get("schemas").is_none());
    }

    #[tokio::test]
    async fn required_workflow_without_default() {
        let yaml = b"version: \"1\"\nworkflows: {a: {}}\n";
        let config = WorkflowConfig::from_yaml(yaml, config_key()).unwrap();
        let err = config.validator(None, &ClientCache::local_only()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Violation(_)));
    }

    #[tokio::test]
    async fn local_schema_on_remote_registry_is_rejected() {
        let yaml = b"version: \"1\"\nworkflows: {a: {metadata_schema: local}}\nschemas: {local: {url: \"file:///tmp/schema.json\"}}\n";
        let config = WorkflowConfig::from_yaml(yaml, config_key()).unwrap();
        let err = config.validator(Some("a"), &ClientCache::local_only()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(m) if m.contains("remote registry")));
    }

    #[tokio::test]
    async fn local_registry_may_use_local_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("meta.json");
        std::fs::write(&schema_path, br#"{"type": "object", "required": ["owner"]}"#).unwrap();
        let config_path = dir.path().join(".quilt/workflows/config.yml");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        let schema_uri = PhysicalKey::local(&schema_path).unwrap().to_uri();
        std::fs::write(
            &config_path,
            format!("version: \"1\"\nworkflows: {{a: {{metadata_schema: m}}}}\nschemas: {{m: {{url: \"{schema_uri}\"}}}}\n"),
        )
        .unwrap();

        let clients = ClientCache::local_only();
        let key = PhysicalKey::local(&config_path).unwrap();
        let config = WorkflowConfig::load(&key, &clients).await.unwrap().unwrap();
        let validator = config.validator(Some("a"), &clients).await.unwrap();
        assert_eq!(validator.data_to_store()["schemas"]["m"], Value::from(schema_uri));
    }
}
