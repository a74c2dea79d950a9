use std::thread;

use quilt_manifest::Manifest;
use serde::{Deserialize, Serialize};

/// Tuning for push and install.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Concurrent uploads or downloads per bucket.
    pub max_concurrency: usize,
    /// Concurrent hashing tasks.
    pub hash_concurrency: usize,
    /// Write a unix-timestamp tag in addition to `latest` on push.
    pub tag_timestamp: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            hash_concurrency: thread::available_parallelism().map_or(4, |n| n.get()),
            tag_timestamp: true,
        }
    }
}

impl TransferConfig {
    pub(crate) fn transfer_limit(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub(crate) fn hash_limit(&self) -> usize {
        self.hash_concurrency.max(1)
    }
}

/// Outcome of a successful push.
#[derive(Clone, Debug)]
pub struct PushResult {
    /// The stored manifest, pointing at the uploaded content.
    pub manifest: Manifest,
    pub top_hash: String,
    pub entries_uploaded: usize,
    pub bytes_uploaded: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallResult {
    pub files_written: usize,
    pub bytes_written: u64,
}
