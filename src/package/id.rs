use anyhow::{Result, bail};
use std::fmt;
use std::str::FromStr;

/// Package name in the repository namespace. Also the folder name under
/// the installation root and the cache, so it must be a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(String);

impl PackageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PackageId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("Package id cannot be empty");
        }
        if s.contains('@') {
            bail!(
                "Invalid package id '{}': '@' separates the version and cannot be part of the id",
                s
            );
        }
        if s.contains(['/', '\\']) {
            bail!("Invalid package id '{}': path separators are not allowed", s);
        }
        if s.starts_with('.') {
            bail!("Invalid package id '{}': ids cannot start with '.'", s);
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            bail!("Invalid package id '{}': whitespace is not allowed", s);
        }
        Ok(PackageId(s.to_string()))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in ["dochub", "dochub-core", "archimate_2.1", "core__", "x"] {
            assert_eq!(id.parse::<PackageId>().unwrap().as_str(), id);
        }
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "a@1.0.0", "a/b", r"a\b", ".", "..", ".staging", "a b"] {
            assert!(id.parse::<PackageId>().is_err(), "{:?} should be rejected", id);
        }
    }

    #[test]
    fn test_display() {
        let id: PackageId = "dochub".parse().unwrap();
        assert_eq!(format!("{}", id), "dochub");
    }
}
