//! Manifests built from local files.
//!
//! Files are stat'ed for their size only; content hashes are left unset
//! until push. A file that cannot be stat'ed is logged and skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quilt_storage::PhysicalKey;
use regex::Regex;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::entry::Entry;
use crate::error::ManifestResult;
use crate::manifest::{Manifest, ManifestBuilder};

fn local_entry(path: &Path, meta: Option<Map<String, Value>>) -> Option<Entry> {
    let stat = match std::fs::metadata(path) {
        Ok(stat) => stat,
        Err(e) => {
            tracing::warn!("skipping unreadable file {:?}: {}", path, e);
            return None;
        }
    };
    match PhysicalKey::local(path) {
        Ok(key) => Some(Entry::new(key, stat.len(), None, meta)),
        Err(e) => {
            tracing::warn!("skipping file {:?}: {}", path, e);
            None
        }
    }
}

impl Manifest {
    /// Build a manifest from explicit logical-key to local-path pairs.
    ///
    /// `object_meta` supplies per-entry metadata by logical key.
    pub fn build_from_paths(
        paths: &BTreeMap<String, PathBuf>,
        user_meta: Option<Value>,
        object_meta: Option<&BTreeMap<String, Map<String, Value>>>,
    ) -> ManifestResult<Manifest> {
        let mut builder = ManifestBuilder::new();
        builder.set_user_meta(user_meta);
        for (logical_key, path) in paths {
            let meta = object_meta.and_then(|m| m.get(logical_key)).cloned();
            if let Some(entry) = local_entry(path, meta) {
                builder.add_entry(logical_key.clone(), entry);
            }
        }
        builder.build()
    }

    /// Build a manifest from every regular file under `dir`.
    ///
    /// Logical keys are `/`-joined paths relative to `dir`. When `pattern` is
    /// given, only keys matching it in full are kept.
    pub fn build_from_dir(
        dir: &Path,
        user_meta: Option<Value>,
        pattern: Option<&str>,
    ) -> ManifestResult<Manifest> {
        let filter = pattern
            .map(|p| Regex::new(&format!("^(?:{p})$")))
            .transpose()?;

        let mut builder = ManifestBuilder::new();
        builder.set_user_meta(user_meta);
        for item in WalkDir::new(dir).max_depth(quilt_storage::io::MAX_WALK_DEPTH) {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("skipping unreadable path under {:?}: {}", dir, e);
                    continue;
                }
            };
            if !item.file_type().is_file() {
                continue;
            }
            let Ok(relative) = item.path().strip_prefix(dir) else {
                continue;
            };
            let logical_key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if filter.as_ref().is_some_and(|re| !re.is_match(&logical_key)) {
                continue;
            }
            if let Some(entry) = local_entry(item.path(), None) {
                builder.add_entry(logical_key, entry);
            }
        }
        builder.build()
    }
}
