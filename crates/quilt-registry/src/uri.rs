//! `quilt+s3://bucket#package=name[@hash|:tag]&path=sub/path` references.

use std::fmt;
use std::str::FromStr;

use quilt_storage::encoding::{decode, encode_fragment_value};
use quilt_storage::PhysicalKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::{RegistryError, RegistryResult};
use crate::names::validate_package_name;
use crate::namespace::LATEST_TAG;

const SCHEME_PREFIX: &str = "quilt+";
const SUPPORTED_SCHEMES: &[&str] = &["s3"];

/// A parsed package reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUri {
    pub scheme: String,
    pub bucket: String,
    pub package: String,
    /// Full hash or hash prefix, when pinned with `@`.
    pub hash: Option<String>,
    /// The hash when pinned, otherwise the tag (`latest` by default).
    pub revision: String,
    /// Logical key or directory inside the package.
    pub path: Option<String>,
    pub catalog: Option<String>,
}

impl PackageUri {
    pub fn parse(uri: &str) -> RegistryResult<Self> {
        let invalid = |reason: &str| RegistryError::InvalidPackageUri {
            uri: uri.to_owned(),
            reason: reason.to_owned(),
        };

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        let scheme = url
            .scheme()
            .strip_prefix(SCHEME_PREFIX)
            .filter(|s| SUPPORTED_SCHEMES.contains(s))
            .ok_or_else(|| invalid("scheme must be quilt+s3"))?
            .to_owned();
        let bucket = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_owned(),
            _ => return Err(invalid("missing bucket")),
        };
        if !matches!(url.path(), "" | "/") {
            return Err(invalid("unexpected path; use the path= fragment parameter"));
        }
        if url.query().is_some() {
            return Err(invalid("unexpected query string"));
        }

        let mut package = None;
        let mut path = None;
        let mut catalog = None;
        for pair in url.fragment().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (name, raw) = pair
                .split_once('=')
                .ok_or_else(|| invalid(&format!("fragment parameter {pair:?} has no value")))?;
            let value = decode(raw).map_err(|reason| invalid(&reason))?;
            let slot = match name {
                "package" => &mut package,
                "path" => &mut path,
                "catalog" => &mut catalog,
                other => return Err(invalid(&format!("unknown fragment parameter {other:?}"))),
            };
            if slot.replace(value).is_some() {
                return Err(invalid(&format!("duplicate fragment parameter {name:?}")));
            }
        }

        let reference = package.ok_or_else(|| invalid("missing package= parameter"))?;
        let (package, hash, tag) = split_revision(&reference).map_err(|reason| invalid(&reason))?;
        validate_package_name(&package)?;
        let revision = hash
            .clone()
            .or(tag)
            .unwrap_or_else(|| LATEST_TAG.to_owned());

        Ok(Self {
            scheme,
            bucket,
            package,
            hash,
            revision,
            path: path.filter(|p| !p.is_empty()),
            catalog,
        })
    }

    /// Root of the registry this reference points into.
    pub fn registry_root(&self) -> PhysicalKey {
        PhysicalKey::remote(self.bucket.clone(), String::new(), None)
    }

    /// Whether the reference is pinned to a hash rather than a tag.
    pub fn is_pinned(&self) -> bool {
        self.hash.is_some()
    }
}

fn split_revision(reference: &str) -> Result<(String, Option<String>, Option<String>), String> {
    if let Some((name, hash)) = reference.split_once('@') {
        let valid = !hash.is_empty()
            && hash.len() <= 64
            && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(format!("invalid top hash {hash:?}"));
        }
        Ok((name.to_owned(), Some(hash.to_owned()), None))
    } else if let Some((name, tag)) = reference.split_once(':') {
        if tag.is_empty() {
            return Err("empty tag".to_owned());
        }
        Ok((name.to_owned(), None, Some(tag.to_owned())))
    } else {
        Ok((reference.to_owned(), None, None))
    }
}

impl fmt::Display for PackageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME_PREFIX}{}://{}#package={}",
            self.scheme,
            self.bucket,
            encode_fragment_value(&self.package)
        )?;
        match &self.hash {
            Some(hash) => write!(f, "@{hash}")?,
            None if self.revision != LATEST_TAG => {
                write!(f, ":{}", encode_fragment_value(&self.revision))?
            }
            None => {}
        }
        if let Some(path) = &self.path {
            write!(f, "&path={}", encode_fragment_value(path))?;
        }
        if let Some(catalog) = &self.catalog {
            write!(f, "&catalog={}", encode_fragment_value(catalog))?;
        }
        Ok(())
    }
}

impl FromStr for PackageUri {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageUri::parse(s)
    }
}

impl Serialize for PackageUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageUri::parse(&s).map_err(serde::de::Error::custom)
    }
}
