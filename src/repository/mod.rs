//! Remote package repository.
//!
//! The repository answers one question: which version satisfies `id@range`
//! and where can it be downloaded from.

mod registry;

use anyhow::Result;
use async_trait::async_trait;

use crate::package::PackageSpec;

pub use registry::{DEFAULT_REPO_SERVER, RegistryClient};

/// Where the content of a resolved package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Archive location understood by the downloader.
    Remote(String),
    /// Shipped with the consuming application, nothing to install.
    BuiltIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub version: String,
    pub source: PackageSource,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Resolve a package request to a concrete version and its source.
    async fn resolve(&self, spec: &PackageSpec) -> Result<ResolvedPackage>;
}
