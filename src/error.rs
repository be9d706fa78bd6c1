//! Domain errors raised by the resolution and installation engine.
//!
//! Functions return `anyhow::Result`; these values travel inside the
//! `anyhow::Error` and can be recovered with `downcast_ref::<PackageError>()`.
//! Transport and filesystem errors are not wrapped here, they pass through
//! with their original context.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// The package directory has no manifest file.
    #[error("Error of package structure. No {file} found in {dir:?}")]
    ManifestMissing { dir: PathBuf, file: &'static str },

    /// The manifest exists but does not describe a package.
    #[error("No available $package metadata in {path:?}: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    /// A version or a version range could not be parsed.
    #[error("invalid version '{value}': {reason}")]
    MalformedVersion { value: String, reason: String },

    #[error(
        "Cyclic dependencies detected. Could not resolve dependencies for [{}]",
        .packages.join(";")
    )]
    CyclicDependency { packages: Vec<String> },

    /// Updating `package` would break one or more installed dependents.
    #[error(
        "Can not resolve dependencies for {package}:\n{}",
        .conflicts.iter().map(|c| format!("  - {c}")).collect::<Vec<_>>().join("\n")
    )]
    DependencyConflict {
        package: String,
        conflicts: Vec<String>,
    },

    #[error("Could not remove package {package} from {root:?} because it is not installed")]
    PackageNotFound { package: String, root: PathBuf },

    /// A fetched archive does not contain an installable package.
    #[error("Structure of the package {package} is incorrect in {path:?}: {reason}")]
    PackageStructureInvalid {
        package: String,
        path: PathBuf,
        reason: String,
    },
}
