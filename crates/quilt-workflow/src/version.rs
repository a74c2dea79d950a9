use std::fmt;
use std::str::FromStr;

use crate::error::WorkflowError;

/// Newest workflows-config format this crate understands.
pub const SUPPORTED_CONFIG_VERSION: ConfigDataVersion = ConfigDataVersion::new(1, 1, 0);

/// A `major.minor.patch` config-format version. Ordering is by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigDataVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ConfigDataVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ConfigDataVersion {
    type Err = WorkflowError;

    /// Missing trailing components are zero: `"1"` is `1.0.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in s.split('.') {
            if count == parts.len() {
                return Err(WorkflowError::Configuration(format!(
                    "malformed config version {s:?}"
                )));
            }
            parts[count] = piece.parse().map_err(|_| {
                WorkflowError::Configuration(format!("malformed config version {s:?}"))
            })?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for ConfigDataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parts_are_zero() {
        assert_eq!("1".parse::<ConfigDataVersion>().unwrap(), ConfigDataVersion::new(1, 0, 0));
        assert_eq!("1.1".parse::<ConfigDataVersion>().unwrap(), ConfigDataVersion::new(1, 1, 0));
        assert_eq!(
            "2.10.3".parse::<ConfigDataVersion>().unwrap(),
            ConfigDataVersion::new(2, 10, 3)
        );
    }

    #[test]
    fn malformed_versions() {
        for bad in ["", "a", "1..2", "1.2.3.4", "-1"] {
            assert!(bad.parse::<ConfigDataVersion>().is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn ordering_is_by_component() {
        let v = |s: &str| s.parse::<ConfigDataVersion>().unwrap();
        assert!(v("1.1") > v("1.0.9"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.99.99"));
        assert!(v("1.1.0") <= SUPPORTED_CONFIG_VERSION);
        assert!(v("1.1.1") > SUPPORTED_CONFIG_VERSION);
        assert_eq!(SUPPORTED_CONFIG_VERSION.to_string(), "1.1.0");
    }
}
