use std::sync::Arc;

use quilt_manifest::Entry;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::{WorkflowError, WorkflowResult};
use crate::schema::LoadedSchema;

/// Checks a package against one workflow before it is pushed.
#[derive(Debug)]
pub struct WorkflowValidator {
    data_to_store: Value,
    is_message_required: bool,
    name_pattern: Option<Regex>,
    metadata_schema: Option<Arc<LoadedSchema>>,
    entries_schema: Option<Arc<LoadedSchema>>,
}

impl WorkflowValidator {
    pub fn new(
        data_to_store: Value,
        is_message_required: bool,
        name_pattern: Option<Regex>,
        metadata_schema: Option<Arc<LoadedSchema>>,
        entries_schema: Option<Arc<LoadedSchema>>,
    ) -> Self {
        Self {
            data_to_store,
            is_message_required,
            name_pattern,
            metadata_schema,
            entries_schema,
        }
    }

    /// Run every check: name pattern, entries schema, metadata schema, then
    /// commit message. The first failure is returned.
    pub fn validate<'a>(
        &self,
        name: &str,
        entries: impl IntoIterator<Item = (&'a str, &'a Entry)>,
        metadata: &Map<String, Value>,
        message: Option<&str>,
    ) -> WorkflowResult<()> {
        self.validate_name(name)?;
        self.validate_entries(entries)?;
        self.validate_metadata(metadata)?;
        self.validate_message(message)
    }

    fn validate_name(&self, name: &str) -> WorkflowResult<()> {
        match &self.name_pattern {
            Some(pattern) if !pattern.is_match(name) => Err(WorkflowError::Violation(format!(
                "package name {name:?} doesn't match required pattern {:?}",
                pattern.as_str()
            ))),
            _ => Ok(()),
        }
    }

    fn validate_entries<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, &'a Entry)>,
    ) -> WorkflowResult<()> {
        let Some(schema) = &self.entries_schema else {
            return Ok(());
        };
        let instance: Vec<Value> = entries
            .into_iter()
            .map(|(logical_key, entry)| {
                json!({
                    "logical_key": logical_key,
                    "size": entry.size(),
                    "meta": Value::Object(entry.meta().clone()),
                })
            })
            .collect();
        schema
            .check(&Value::Array(instance))
            .map_err(|e| WorkflowError::Violation(format!("package entries failed validation: {e}")))
    }

    fn validate_metadata(&self, metadata: &Map<String, Value>) -> WorkflowResult<()> {
        let Some(schema) = &self.metadata_schema else {
            return Ok(());
        };
        let user_meta = metadata.get("user_meta").cloned().unwrap_or(Value::Null);
        schema
            .check(&user_meta)
            .map_err(|e| WorkflowError::Violation(format!("metadata failed validation: {e}")))
    }

    fn validate_message(&self, message: Option<&str>) -> WorkflowResult<()> {
        if self.is_message_required && message.map_or(true, str::is_empty) {
            return Err(WorkflowError::Violation(
                "commit message is required by workflow, but none was provided".to_owned(),
            ));
        }
        Ok(())
    }

    /// Provenance to store under the manifest's `workflow` key.
    pub fn data_to_store(&self) -> Value {
        self.data_to_store.clone()
    }
}
