//! Package specification parsing for the install command.

use anyhow::{Result, anyhow};
use std::str::FromStr;

use super::PackageId;
use crate::version::VersionRequest;

/// A package specification that may include a version range
/// Format: "package" or "package@range"
#[derive(Debug, PartialEq, Clone)]
pub struct PackageSpec {
    pub id: PackageId,
    pub request: VersionRequest,
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.request.as_range() {
            Some(range) => write!(f, "{}@{}", self.id, range),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for PackageSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id_part, range) = match s.split_once('@') {
            Some((id, range)) => {
                if range.trim().is_empty() {
                    return Err(anyhow!(
                        "Invalid format: version after @ cannot be empty. Expected 'package@range'."
                    ));
                }
                (id, Some(range))
            }
            None => (s, None),
        };

        let id = id_part.parse::<PackageId>()?;
        Ok(PackageSpec {
            id,
            request: VersionRequest::parse(range),
        })
    }
}
