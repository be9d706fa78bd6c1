use anyhow::{Context, Result};
use futures_util::future::{FutureExt, LocalBoxFuture};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::cache::CacheManager;
use crate::download::Downloader;
use crate::error::PackageError;
use crate::index::InstalledEntry;
use crate::manifest::{PackageMetadata, read_metadata};
use crate::package::{PackageId, PackageSpec};
use crate::repository::{PackageSource, RepositoryClient};
use crate::runtime::Runtime;
use crate::version::{VersionRequest, satisfies};

use super::RunContext;

/// Resolves packages against the repository and keeps installation roots,
/// the cache and the installed index in step.
pub struct PackageManager<R: Runtime, C: RepositoryClient, D: Downloader> {
    runtime: R,
    repository: C,
    cache: CacheManager<R, D>,
}

impl<R: Runtime, C: RepositoryClient, D: Downloader> PackageManager<R, C, D> {
    pub fn new(runtime: R, repository: C, cache: CacheManager<R, D>) -> Self {
        Self {
            runtime,
            repository,
            cache,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn cache(&self) -> &CacheManager<R, D> {
        &self.cache
    }

    /// Make `id` available in `root` in a version matching `request`, then do
    /// the same for every dependency it declares. Returns the version in use.
    pub fn specific_install<'a>(
        &'a self,
        ctx: &'a mut RunContext,
        root: &'a Path,
        id: &'a PackageId,
        request: &'a VersionRequest,
    ) -> LocalBoxFuture<'a, Result<String>> {
        async move {
            ctx.enter(root, id)?;
            let result = self.install_one(ctx, root, id, request).await;
            ctx.leave();
            result
        }
        .boxed_local()
    }

    async fn install_one(
        &self,
        ctx: &mut RunContext,
        root: &Path,
        id: &PackageId,
        request: &VersionRequest,
    ) -> Result<String> {
        let current = ctx
            .index_mut()
            .installed_version(&self.runtime, root, id.as_str())?;

        if let Some(current) = &current
            && satisfies(current, request)?
        {
            debug!("{} {} satisfies {}", id, current, request);
            let source = ctx
                .index_mut()
                .find(&self.runtime, root, id.as_str())?
                .map(|(entry, _)| entry.source.clone());
            if let Some(source) = source {
                let metadata = read_metadata(&self.runtime, &source)?;
                self.resolve_dependencies(ctx, root, &metadata).await?;
            }
            return Ok(current.clone());
        }

        let spec = PackageSpec {
            id: id.clone(),
            request: request.clone(),
        };
        let resolved = self.repository.resolve(&spec).await?;

        let locator = match resolved.source {
            PackageSource::BuiltIn => {
                info!("{} {} is built in", id, resolved.version);
                return Ok(resolved.version);
            }
            PackageSource::Remote(locator) => locator,
        };

        if let Some(current) = &current {
            let conflicts = self.is_available_to_update(ctx, id, &resolved.version)?;
            if !conflicts.is_empty() {
                return Err(PackageError::DependencyConflict {
                    package: id.to_string(),
                    conflicts,
                }
                .into());
            }
            info!("Updating {} from {} to {}", id, current, resolved.version);
            self.cache.invalidate(id)?;
            self.remove_package_from(ctx, root, id)?;
        }

        let cached = self.cache.fetch_into(&locator, id).await?;
        if let Err(e) = read_metadata(&self.runtime, &cached) {
            self.cache.invalidate(id)?;
            return Err(PackageError::PackageStructureInvalid {
                package: id.to_string(),
                path: cached,
                reason: e.to_string(),
            }
            .into());
        }

        let target = root.join(id.as_str());
        if self.runtime.exists(&target) {
            warn!("Replacing unexpected content at {:?}", target);
            self.runtime.remove_dir_all(&target)?;
            ctx.index_mut().record_removal(root, &target);
        }
        self.runtime
            .copy_dir_all(&cached, &target)
            .with_context(|| format!("Failed to install {} into {:?}", id, root))?;

        let metadata = read_metadata(&self.runtime, &target)?;
        ctx.index_mut().fetch(&self.runtime, root)?;
        ctx.index_mut().record_install(
            root,
            InstalledEntry {
                source: target.clone(),
                metadata: metadata.clone(),
            },
        )?;
        println!("   installed {} {}", id, resolved.version);

        self.resolve_dependencies(ctx, root, &metadata).await?;
        Ok(resolved.version)
    }

    /// Install every dependency declared by any sub-package of `metadata`, in
    /// declaration order. Dependencies on sub-packages of the same package are
    /// already satisfied.
    async fn resolve_dependencies(
        &self,
        ctx: &mut RunContext,
        root: &Path,
        metadata: &PackageMetadata,
    ) -> Result<()> {
        for (sub_id, sub_package) in metadata.iter() {
            for (dependency, range) in &sub_package.dependencies {
                if metadata.contains(dependency) {
                    continue;
                }
                let dependency_id: PackageId = dependency
                    .parse()
                    .with_context(|| format!("Invalid dependency of {}", sub_id))?;
                let request = VersionRequest::parse(Some(range));
                self.specific_install(ctx, root, &dependency_id, &request)
                    .await?;
            }
        }
        Ok(())
    }

    /// Every installed dependent, in every root indexed in this run, that would
    /// not accept `proposed` as the version of `id`. Empty means the update is safe.
    pub fn is_available_to_update(
        &self,
        ctx: &RunContext,
        id: &PackageId,
        proposed: &str,
    ) -> Result<Vec<String>> {
        let mut conflicts = Vec::new();
        for (_, entries) in ctx.index().roots() {
            for entry in entries {
                // The package being replaced goes away together with its own requirements
                if entry.metadata.contains(id.as_str()) {
                    continue;
                }
                for (dependent, sub_package) in entry.metadata.iter() {
                    let Some(range) = sub_package.dependency(id.as_str()) else {
                        continue;
                    };
                    if !satisfies(proposed, &VersionRequest::parse(Some(range)))? {
                        conflicts.push(format!(
                            "Conflict version of dependencies. For {} required {} version, but package {} requires {} version.",
                            id, proposed, dependent, range
                        ));
                    }
                }
            }
        }
        Ok(conflicts)
    }

    /// Delete the installed copy of `id` from `root`. Dependents are left alone.
    #[tracing::instrument(skip(self, ctx))]
    pub fn remove_package_from(
        &self,
        ctx: &mut RunContext,
        root: &Path,
        id: &PackageId,
    ) -> Result<PathBuf> {
        let source = ctx
            .index_mut()
            .find(&self.runtime, root, id.as_str())?
            .map(|(entry, _)| entry.source.clone())
            .ok_or_else(|| PackageError::PackageNotFound {
                package: id.to_string(),
                root: root.to_path_buf(),
            })?;

        debug!("Removing {} from {:?}", id, source);
        if self.runtime.exists(&source) {
            self.runtime.remove_dir_all(&source)?;
        }
        ctx.index_mut().record_removal(root, &source);
        Ok(source)
    }

    /// Install every dependency declared in the manifest of `project_dir` into `root`.
    pub async fn all_install(
        &self,
        ctx: &mut RunContext,
        project_dir: &Path,
        root: &Path,
    ) -> Result<()> {
        let metadata = read_metadata(&self.runtime, project_dir)?;
        info!("Installing dependencies of {:?} into {:?}", project_dir, root);
        self.resolve_dependencies(ctx, root, &metadata).await
    }
}
