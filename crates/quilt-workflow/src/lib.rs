//! Workflow policies for Quilt registries.
//!
//! A registry may carry a YAML config at `.quilt/workflows/config.yml`
//! naming one or more workflows. Each workflow can require a package-name
//! pattern, a commit message, and JSON-Schema conformance of the package
//! metadata and entry list. Pushes obtain a [`WorkflowValidator`] from the
//! [`WorkflowConfig`] and run it before any upload; the validator also
//! produces the provenance object stored under the manifest's `workflow`
//! key.

pub mod config;
pub mod error;
pub mod schema;
pub mod validator;
pub mod version;

pub use config::WorkflowConfig;
pub use error::{WorkflowError, WorkflowResult};
pub use schema::LoadedSchema;
pub use validator::WorkflowValidator;
pub use version::{ConfigDataVersion, SUPPORTED_CONFIG_VERSION};
