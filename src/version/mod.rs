//! Version matching for installed packages.
//!
//! Manifests declare ranges in the npm dialect (`^1.2.0`, `>=1.0.0 <2.0.0`,
//! `1.x || 2.x`, `1.0.0 - 1.4.0`, bare `1.2.3` meaning exact). They are
//! translated to one or more `semver::VersionReq` alternatives.

use anyhow::Result;
use semver::{Version, VersionReq};
use std::fmt;

use crate::error::PackageError;

/// Version part of an install request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    /// Whatever is installed, otherwise the latest release.
    #[default]
    Any,
    /// A range string as written in a manifest or on the command line.
    Range(String),
}

impl VersionRequest {
    /// Empty, `*` and `latest` carry no constraint.
    pub fn parse(range: Option<&str>) -> Self {
        match range.map(str::trim) {
            None | Some("") | Some("*") | Some("latest") => VersionRequest::Any,
            Some(range) => VersionRequest::Range(range.to_string()),
        }
    }

    pub fn as_range(&self) -> Option<&str> {
        match self {
            VersionRequest::Any => None,
            VersionRequest::Range(range) => Some(range),
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Any => write!(f, "latest"),
            VersionRequest::Range(range) => write!(f, "{}", range),
        }
    }
}

/// Parse an installed version, tolerating a leading `v`.
pub fn parse_version(value: &str) -> Result<Version> {
    let trimmed = value.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| {
        PackageError::MalformedVersion {
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Check whether `installed` falls into `request`.
pub fn satisfies(installed: &str, request: &VersionRequest) -> Result<bool> {
    let version = parse_version(installed)?;
    match request {
        VersionRequest::Any => Ok(true),
        VersionRequest::Range(range) => {
            let alternatives = parse_range(range)?;
            Ok(alternatives.iter().any(|req| req.matches(&version)))
        }
    }
}

/// Translate an npm style range into `semver` requirements, one per `||` branch.
pub fn parse_range(range: &str) -> Result<Vec<VersionReq>> {
    let malformed = |reason: String| PackageError::MalformedVersion {
        value: range.to_string(),
        reason,
    };

    let mut alternatives = Vec::new();
    for branch in range.split("||") {
        let comparators = branch_comparators(branch.trim()).map_err(malformed)?;
        let req = if comparators.is_empty() {
            VersionReq::STAR
        } else {
            VersionReq::parse(&comparators.join(", ")).map_err(|e| malformed(e.to_string()))?
        };
        alternatives.push(req);
    }
    Ok(alternatives)
}

fn branch_comparators(branch: &str) -> std::result::Result<Vec<String>, String> {
    let tokens = tokenize(branch);

    // Hyphen range: "1.0.0 - 2.0.0"
    if tokens.len() == 3 && tokens[1] == "-" {
        return Ok(vec![
            format!(">={}", strip_v(&tokens[0])),
            format!("<={}", strip_v(&tokens[2])),
        ]);
    }

    let mut comparators = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token == "-" {
            return Err("dangling '-' in range".to_string());
        }
        if token == "*" || token == "x" || token == "X" {
            continue;
        }
        comparators.push(normalize_comparator(&token));
    }
    Ok(comparators)
}

/// Split on whitespace, gluing operators written apart from their version (`>= 1.0.0`).
fn tokenize(branch: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for part in branch.split_whitespace() {
        if is_operator(part) {
            pending_op = Some(part.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, part)),
            None => tokens.push(part.to_string()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op);
    }
    tokens
}

fn is_operator(part: &str) -> bool {
    matches!(part, ">" | ">=" | "<" | "<=" | "=" | "^" | "~")
}

fn normalize_comparator(token: &str) -> String {
    let op_len = token
        .find(|c: char| !matches!(c, '>' | '<' | '=' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = strip_v(version);

    if op.is_empty() {
        // npm treats a bare full version as exact, partial ones ("1", "1.2", "1.x") as wildcards
        if version.contains(['x', 'X', '*']) {
            version.to_string()
        } else if version.split('.').count() >= 3 {
            format!("={}", version)
        } else {
            format!("{}.*", version)
        }
    } else {
        format!("{}{}", op, version)
    }
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}
