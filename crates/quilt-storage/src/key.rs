use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{decode, decode_bytes, encode_path, encode_path_bytes, encode_query_value};
use crate::error::{StorageError, StorageResult};

const VERSION_ID_PARAM: &str = "versionId";

/// Locator for a single blob in a local filesystem or a versioned object store.
///
/// Keys are immutable values; operations that learn a backend-assigned
/// version id return a new key rather than updating this one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhysicalKey {
    /// An absolute path on the local filesystem.
    Local { path: PathBuf },
    /// An object in a bucket, optionally pinned to one version.
    Remote {
        bucket: String,
        key: String,
        version_id: Option<String>,
    },
}

impl PhysicalKey {
    /// Local key for `path`, made absolute against the working directory.
    pub fn local(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|e| StorageError::io(path, e))?;
        Ok(PhysicalKey::Local { path })
    }

    pub fn remote(
        bucket: impl Into<String>,
        key: impl Into<String>,
        version_id: Option<String>,
    ) -> Self {
        PhysicalKey::Remote {
            bucket: bucket.into(),
            key: key.into(),
            version_id,
        }
    }

    /// Parse a `file://` or `s3://` URI.
    ///
    /// The path is taken verbatim: `.` and `..` segments are part of the
    /// key, not navigation.
    pub fn from_uri(uri: &str) -> StorageResult<Self> {
        let invalid = |reason: &str| StorageError::InvalidUri {
            uri: uri.to_owned(),
            reason: reason.to_owned(),
        };
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://"))?;
        if rest.contains('#') {
            return Err(invalid("physical keys must not have a fragment"));
        }
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, ""),
        };
        if authority.contains('@') {
            return Err(invalid("physical keys must not carry user info"));
        }

        match scheme.to_ascii_lowercase().as_str() {
            "file" => {
                if authority.contains(':') {
                    return Err(invalid("file URIs must not have a port"));
                }
                if !(authority.is_empty() || authority.eq_ignore_ascii_case("localhost")) {
                    return Err(invalid("file URIs must not name a host"));
                }
                if query.is_some() {
                    return Err(invalid("file URIs must not have a query"));
                }
                if path.is_empty() {
                    return Err(invalid("file URI paths must be absolute"));
                }
                let bytes = decode_bytes(path).map_err(|e| invalid(&e))?;
                let path = path_from_bytes(bytes).map_err(|e| invalid(&e))?;
                Ok(PhysicalKey::Local { path })
            }
            "s3" => {
                if authority.is_empty() {
                    return Err(invalid("missing bucket"));
                }
                if authority.contains(':') {
                    return Err(invalid("s3 URIs must not have a port"));
                }
                let raw_key = path.strip_prefix('/').unwrap_or(path);
                let key = decode(raw_key).map_err(|e| invalid(&e))?;
                let mut version_id = None;
                for pair in query.unwrap_or("").split('&') {
                    if let Some((name, value)) = pair.split_once('=') {
                        if name == VERSION_ID_PARAM {
                            version_id = Some(decode(value).map_err(|e| invalid(&e))?);
                        }
                    }
                }
                Ok(PhysicalKey::Remote {
                    bucket: authority.to_owned(),
                    key,
                    version_id,
                })
            }
            other => Err(StorageError::UnsupportedScheme(other.to_owned())),
        }
    }

    /// Canonical URI form; inverts [`PhysicalKey::from_uri`].
    pub fn to_uri(&self) -> String {
        match self {
            PhysicalKey::Local { path } => {
                format!("file://{}", encode_path_bytes(&path_bytes(path)))
            }
            PhysicalKey::Remote {
                bucket,
                key,
                version_id,
            } => {
                let mut uri = format!("s3://{}/{}", bucket, encode_path(key));
                if let Some(version) = version_id {
                    uri.push('?');
                    uri.push_str(VERSION_ID_PARAM);
                    uri.push('=');
                    uri.push_str(&encode_query_value(version));
                }
                uri
            }
        }
    }

    /// Join `child` beneath this key, treating this key as a directory.
    ///
    /// Fails for remote keys pinned to a version id.
    pub fn resolve(&self, child: &str) -> StorageResult<Self> {
        let child = child.trim_start_matches('/');
        match self {
            PhysicalKey::Local { path } => Ok(PhysicalKey::Local {
                path: path.join(child),
            }),
            PhysicalKey::Remote {
                version_id: Some(_),
                ..
            } => Err(StorageError::InvalidOperation(format!(
                "cannot resolve {child:?} under versioned key {self}"
            ))),
            PhysicalKey::Remote { bucket, key, .. } => {
                let key = if key.is_empty() || key.ends_with('/') {
                    format!("{key}{child}")
                } else {
                    format!("{key}/{child}")
                };
                Ok(PhysicalKey::Remote {
                    bucket: bucket.clone(),
                    key,
                    version_id: None,
                })
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PhysicalKey::Local { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PhysicalKey::Remote { .. })
    }

    /// Bucket name for remote keys.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            PhysicalKey::Remote { bucket, .. } => Some(bucket),
            PhysicalKey::Local { .. } => None,
        }
    }

    /// Pinned version id, if any.
    pub fn version_id(&self) -> Option<&str> {
        match self {
            PhysicalKey::Remote { version_id, .. } => version_id.as_deref(),
            PhysicalKey::Local { .. } => None,
        }
    }

    /// Same location pinned to `version_id` (local keys are returned as-is).
    pub fn with_version(&self, version_id: Option<String>) -> Self {
        match self {
            PhysicalKey::Remote { bucket, key, .. } => PhysicalKey::Remote {
                bucket: bucket.clone(),
                key: key.clone(),
                version_id,
            },
            local => local.clone(),
        }
    }

    /// Final path component, used as a default logical key.
    pub fn basename(&self) -> &str {
        match self {
            PhysicalKey::Local { path } => path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            PhysicalKey::Remote { key, .. } => key.rsplit('/').next().unwrap_or(key),
        }
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|_| "escapes do not decode to UTF-8".to_owned())
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for PhysicalKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhysicalKey::from_uri(s)
    }
}

impl Serialize for PhysicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for PhysicalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        PhysicalKey::from_uri(&uri).map_err(serde::de::Error::custom)
    }
}
