//! Quilt registries, namespaces and package references.
//!
//! A registry is rooted at any [`PhysicalKey`](quilt_storage::PhysicalKey)
//! directory and lays out its data as:
//!
//! ```text
//! <root>/.quilt/named_packages/<namespace>/<tag>   -> hex top hash
//! <root>/.quilt/packages/<top hash>                -> manifest (JSON lines)
//! <root>/.quilt/workflows/config.yml               -> workflows config
//! ```
//!
//! A [`Namespace`] resolves mutable tags (`latest`, a unix timestamp) and
//! hash prefixes to immutable manifests. [`PackageUri`] parses the
//! `quilt+s3://bucket#package=...` reference form.

pub mod error;
pub mod names;
pub mod namespace;
pub mod registry;
pub mod uri;

pub use error::{RegistryError, RegistryResult};
pub use namespace::Namespace;
pub use registry::{create_namespace_at_uri, Registry};
pub use uri::PackageUri;
