use jsonschema::{Draft, Validator};
use quilt_storage::PhysicalKey;
use serde_json::Value;

use crate::error::{WorkflowError, WorkflowResult};

/// The only meta-schema accepted in `$schema`.
pub const DRAFT_07_META_SCHEMA: &str = "http://json-schema.org/draft-07/schema#";

const CONFIG_SCHEMA: &str = include_str!("../schemas/config-1.schema.json");

/// Upper bound on validation messages carried in one error.
const MAX_REPORTED_ERRORS: usize = 5;

/// A compiled JSON Schema together with the location it was read from.
pub struct LoadedSchema {
    validator: Validator,
    location: PhysicalKey,
}

impl LoadedSchema {
    /// Compile `schema` as draft-07.
    ///
    /// A `$schema` declaration, when present, must name draft-07.
    pub fn compile(schema: &Value, location: PhysicalKey) -> WorkflowResult<Self> {
        match schema.get("$schema") {
            None => {}
            Some(Value::String(meta)) if meta == DRAFT_07_META_SCHEMA => {}
            Some(Value::String(meta)) => {
                return Err(WorkflowError::Configuration(format!(
                    "unsupported meta-schema {meta:?} in {location}"
                )))
            }
            Some(_) => {
                return Err(WorkflowError::Configuration(format!(
                    "$schema must be a string in {location}"
                )))
            }
        }
        let validator = compile_draft7(schema)
            .map_err(|e| WorkflowError::Configuration(format!("invalid schema at {location}: {e}")))?;
        Ok(Self {
            validator,
            location,
        })
    }

    /// Where the schema was loaded from, pinned to the version read.
    pub fn location(&self) -> &PhysicalKey {
        &self.location
    }

    /// Validate `instance`, describing the first few failures on error.
    pub fn check(&self, instance: &Value) -> Result<(), String> {
        describe_errors(&self.validator, instance)
    }
}

impl std::fmt::Debug for LoadedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSchema")
            .field("location", &self.location.to_uri())
            .finish()
    }
}

fn compile_draft7(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(schema)
        .map_err(|e| e.to_string())
}

fn describe_errors(validator: &Validator, instance: &Value) -> Result<(), String> {
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .take(MAX_REPORTED_ERRORS)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}

/// Validate a parsed workflows config against the embedded config schema.
pub(crate) fn check_config_document(document: &Value) -> WorkflowResult<()> {
    let schema: Value = serde_json::from_str(CONFIG_SCHEMA)
        .map_err(|e| WorkflowError::Configuration(format!("embedded config schema: {e}")))?;
    let validator = compile_draft7(&schema).map_err(WorkflowError::Configuration)?;
    describe_errors(&validator, document)
        .map_err(|e| WorkflowError::Configuration(format!("workflows config failed validation: {e}")))
}
