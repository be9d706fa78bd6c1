use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::error::PackageError;
use crate::runtime::Runtime;

use super::{MANIFEST_FILE, ManifestDocument, PackageMetadata};

/// Read the `$package` metadata of the package stored in `package_dir`.
///
/// This is the only place deciding whether a directory is a package.
#[tracing::instrument(skip(runtime))]
pub fn read_metadata<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<PackageMetadata> {
    let path = package_dir.join(MANIFEST_FILE);
    if !runtime.exists(&path) {
        return Err(PackageError::ManifestMissing {
            dir: package_dir.to_path_buf(),
            file: MANIFEST_FILE,
        }
        .into());
    }

    debug!("Reading package metadata from {:?}", path);
    let text = runtime.read_to_string(&path)?;

    let malformed = |reason: String| PackageError::ManifestMalformed {
        path: path.clone(),
        reason,
    };
    let document = ManifestDocument::parse(&text).map_err(|e| malformed(format!("{:#}", e)))?;
    let metadata = document
        .package_metadata()
        .map_err(|e| malformed(e.to_string()))?;
    Ok(metadata)
}
