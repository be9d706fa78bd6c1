//! YAML manifest document with the few edits the installer performs.
//!
//! Edits go through `serde_yaml::Mapping`, which keeps key order, so fields
//! the installer does not touch come back in their original position.
//! Comments are not preserved.

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::runtime::Runtime;

use super::{PACKAGE_KEY, PackageMetadata, SubPackage};

const DEFAULT_PROJECT_MANIFEST: &str = "$package:\n  \".\":\n    version: 1.0.0\n";

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    root: Mapping,
}

impl ManifestDocument {
    /// Parse manifest text. An empty document is an empty mapping.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text).context("Failed to parse YAML")?;
        match value {
            Value::Null => Ok(Self {
                root: Mapping::new(),
            }),
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(anyhow!(
                "Expected a mapping at the top of the manifest, found {}",
                kind_of(&other)
            )),
        }
    }

    /// Manifest used when a project has none yet.
    pub fn default_project() -> Self {
        Self::parse(DEFAULT_PROJECT_MANIFEST).unwrap_or_else(|_| Self {
            root: Mapping::new(),
        })
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(&self.root).context("Failed to serialize manifest")
    }

    /// Typed view of the `$package` key.
    pub fn package_metadata(&self) -> Result<PackageMetadata> {
        let packages = match self.root.get(PACKAGE_KEY) {
            Some(Value::Mapping(packages)) => packages,
            Some(other) => {
                return Err(anyhow!(
                    "{} must be a mapping, found {}",
                    PACKAGE_KEY,
                    kind_of(other)
                ));
            }
            None => return Err(anyhow!("missing {} key", PACKAGE_KEY)),
        };

        let mut metadata = PackageMetadata::new();
        for (id, body) in packages {
            let id = scalar_to_string(id)
                .ok_or_else(|| anyhow!("sub-package ids must be scalars"))?;
            metadata.insert(id.clone(), parse_sub_package(&id, body)?);
        }
        Ok(metadata)
    }

    /// Declare `package_id: range` on `this_package` (first declared sub-package
    /// when `None`). Returns whether the document changed.
    pub fn add_dependency(
        &mut self,
        package_id: &str,
        range: &str,
        this_package: Option<&str>,
    ) -> Result<bool> {
        if !self.root.contains_key(PACKAGE_KEY) {
            let this_package = this_package.unwrap_or(".");
            debug!(
                "No {} entry found. It will be created with package id {}",
                PACKAGE_KEY, this_package
            );
            let mut packages = Mapping::new();
            packages.insert(Value::from(this_package), Value::Mapping(Mapping::new()));
            self.root
                .insert(Value::from(PACKAGE_KEY), Value::Mapping(packages));
        }

        let packages = match self.root.get_mut(PACKAGE_KEY) {
            Some(Value::Mapping(packages)) => packages,
            _ => return Err(anyhow!("{} must be a mapping", PACKAGE_KEY)),
        };

        let this_package = match this_package {
            Some(id) => id.to_string(),
            None => packages
                .keys()
                .next()
                .and_then(scalar_to_string)
                .unwrap_or_else(|| ".".to_string()),
        };

        let body = packages
            .entry(Value::from(this_package.as_str()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if body.is_null() {
            *body = Value::Mapping(Mapping::new());
        }
        let body = body
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("sub-package {} must be a mapping", this_package))?;

        let dependencies = body
            .entry(Value::from("dependencies"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if dependencies.is_null() {
            *dependencies = Value::Mapping(Mapping::new());
        }
        let dependencies = dependencies
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("dependencies of {} must be a mapping", this_package))?;

        let current = dependencies.get(package_id).and_then(scalar_to_string);
        if current.as_deref() == Some(range) {
            return Ok(false);
        }
        dependencies.insert(Value::from(package_id), Value::from(range));
        Ok(true)
    }

    /// Append `link` to `imports` unless already listed. Returns whether the document changed.
    pub fn add_import(&mut self, link: &str) -> Result<bool> {
        let imports = self
            .root
            .entry(Value::from("imports"))
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if imports.is_null() {
            *imports = Value::Sequence(Vec::new());
        }
        let imports = imports
            .as_sequence_mut()
            .ok_or_else(|| anyhow!("imports must be a list"))?;

        if imports.iter().any(|item| item.as_str() == Some(link)) {
            return Ok(false);
        }
        imports.push(Value::from(link));
        Ok(true)
    }
}

fn parse_sub_package(id: &str, body: &Value) -> Result<SubPackage> {
    let body = match body {
        Value::Null => return Ok(SubPackage::default()),
        Value::Mapping(body) => body,
        other => {
            return Err(anyhow!(
                "sub-package {} must be a mapping, found {}",
                id,
                kind_of(other)
            ));
        }
    };

    let version = body.get("version").and_then(scalar_to_string);

    let dependencies = match body.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(deps)) => deps
            .iter()
            .map(|(dep_id, range)| {
                let dep_id = scalar_to_string(dep_id)
                    .ok_or_else(|| anyhow!("dependency ids of {} must be scalars", id))?;
                // `null` range means any version
                let range = scalar_to_string(range).unwrap_or_default();
                Ok((dep_id, range))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(anyhow!(
                "dependencies of {} must be a mapping, found {}",
                id,
                kind_of(other)
            ));
        }
    };

    Ok(SubPackage {
        version,
        dependencies,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Record a dependency in the manifest at `path`, creating the file when missing.
#[tracing::instrument(skip(runtime))]
pub fn add_dependency_to_manifest<R: Runtime>(
    runtime: &R,
    path: &Path,
    package_id: &str,
    range: &str,
    this_package: Option<&str>,
) -> Result<()> {
    let mut document = if runtime.exists(path) {
        ManifestDocument::parse(&runtime.read_to_string(path)?)
            .with_context(|| format!("Failed to parse manifest {:?}", path))?
    } else {
        ManifestDocument::default_project()
    };

    if document.add_dependency(package_id, range, this_package)? {
        debug!("Recording dependency {}: {} in {:?}", package_id, range, path);
        runtime.write(path, document.to_yaml_string()?.as_bytes())?;
    }
    Ok(())
}

/// Register `link` in the `imports` list of the manifest at `path`.
#[tracing::instrument(skip(runtime))]
pub fn add_import_to_manifest<R: Runtime>(runtime: &R, path: &Path, link: &str) -> Result<()> {
    let mut document = if runtime.exists(path) {
        ManifestDocument::parse(&runtime.read_to_string(path)?)
            .with_context(|| format!("Failed to parse manifest {:?}", path))?
    } else {
        ManifestDocument::default_project()
    };

    if document.add_import(link)? {
        debug!("Registering import {} in {:?}", link, path);
        runtime.write(path, document.to_yaml_string()?.as_bytes())?;
    }
    Ok(())
}
