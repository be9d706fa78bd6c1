//! Package manifests.
//!
//! Every package directory carries a `dochub.yaml` whose `$package` key maps
//! sub-package ids to their version and dependencies:
//!
//! ```yaml
//! $package:
//!   ".":
//!     version: 1.2.0
//!     dependencies:
//!       dochub-core: ^2.0.0
//! ```

mod document;
mod imports;
mod reader;

pub use document::{ManifestDocument, add_dependency_to_manifest, add_import_to_manifest};
pub use imports::{IMPORTS_FILE, make_imports_file};
pub use reader::read_metadata;

/// Name of the manifest file inside every package directory.
pub const MANIFEST_FILE: &str = "dochub.yaml";

/// Top-level manifest key holding the package metadata.
pub const PACKAGE_KEY: &str = "$package";

/// Declared identity of one sub-package.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubPackage {
    pub version: Option<String>,
    /// Dependency id and range, in declaration order.
    pub dependencies: Vec<(String, String)>,
}

impl SubPackage {
    pub fn dependency(&self, package_id: &str) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|(id, _)| id == package_id)
            .map(|(_, range)| range.as_str())
    }
}

/// Sub-package id to record mapping, kept in manifest order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageMetadata {
    packages: Vec<(String, SubPackage)>,
}

impl PackageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a sub-package, keeping the original position on replace.
    pub fn insert(&mut self, id: impl Into<String>, package: SubPackage) {
        let id = id.into();
        match self.packages.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, slot)) => *slot = package,
            None => self.packages.push((id, package)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SubPackage> {
        self.packages
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, package)| package)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SubPackage)> {
        self.packages.iter().map(|(id, package)| (id.as_str(), package))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
