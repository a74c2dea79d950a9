//! Package and tag name validation.
//!
//! A package name is exactly two non-empty segments joined by `/`
//! (`<prefix>/<suffix>`). Segments contain ASCII letters, digits, `_` and
//! `-`. Tag names are single path components that cannot escape the
//! namespace directory.

use crate::error::{RegistryError, RegistryResult};

/// Length of a full hex top hash.
pub const TOP_HASH_LEN: usize = 64;

/// Shortest hash prefix accepted by [`Namespace::resolve_hash`](crate::Namespace::resolve_hash).
pub const MIN_HASH_PREFIX_LEN: usize = 6;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a package name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use quilt_registry::names::validate_package_name;
///
/// assert!(validate_package_name("user/dataset").is_ok());
/// assert!(validate_package_name("dataset").is_err());
/// assert!(validate_package_name("a/b/c").is_err());
/// ```
pub fn validate_package_name(name: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::InvalidPackageName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    let (prefix, suffix) = name
        .split_once('/')
        .ok_or_else(|| invalid("expected <prefix>/<suffix>"))?;
    if suffix.contains('/') {
        return Err(invalid("expected exactly one '/'"));
    }
    for segment in [prefix, suffix] {
        if segment.is_empty() {
            return Err(invalid("segments must not be empty"));
        }
        if let Some(c) = segment.chars().find(|c| !is_name_char(*c)) {
            return Err(invalid(&format!("contains forbidden character: {c:?}")));
        }
    }
    Ok(())
}

/// Validate a tag name.
pub fn validate_tag_name(name: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::InvalidTagName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.is_empty() {
        return Err(invalid("tag name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("tag name must not be a relative path component"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("tag name must not contain path separators"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("tag name must not contain control characters"));
    }
    Ok(())
}

/// Whether `s` looks like a full top hash: 64 lowercase hex digits.
pub fn is_top_hash(s: &str) -> bool {
    s.len() == TOP_HASH_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_package_names() {
        assert!(validate_package_name("test/test").is_ok());
        assert!(validate_package_name("quilt-example/my_data-2").is_ok());
    }

    #[test]
    fn reject_single_segment() {
        assert!(validate_package_name("dataset").is_err());
    }

    #[test]
    fn reject_extra_segments() {
        assert!(validate_package_name("a/b/c").is_err());
    }

    #[test]
    fn reject_empty_segments() {
        assert!(validate_package_name("/b").is_err());
        assert!(validate_package_name("a/").is_err());
        assert!(validate_package_name("").is_err());
    }

    #[test]
    fn reject_traversal_and_spaces() {
        assert!(validate_package_name("../etc").is_err());
        assert!(validate_package_name("a b/c").is_err());
        assert!(validate_package_name("a/b.c").is_err());
    }

    #[test]
    fn tag_names() {
        assert!(validate_tag_name("latest").is_ok());
        assert!(validate_tag_name("1700000000").is_ok());
        assert!(validate_tag_name("").is_err());
        assert!(validate_tag_name("..").is_err());
        assert!(validate_tag_name("a/b").is_err());
    }

    #[test]
    fn top_hash_shape() {
        assert!(is_top_hash(&"a".repeat(64)));
        assert!(!is_top_hash(&"A".repeat(64)));
        assert!(!is_top_hash(&"a".repeat(63)));
        assert!(!is_top_hash(&"g".repeat(64)));
    }
}
