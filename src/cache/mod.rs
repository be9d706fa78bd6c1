//! Local cache of unpacked package archives.
//!
//! Every package id has one slot, `cache_root/<id>`. A slot that exists is
//! complete: downloads land in `cache_root/.staging/<id>` first and are renamed
//! into place once unpacked. Package ids never start with `.`, so staging
//! paths and downloaded archives cannot be mistaken for a slot.

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::download::Downloader;
use crate::package::PackageId;
use crate::runtime::Runtime;

const STAGING_DIR: &str = ".staging";

pub struct CacheManager<R: Runtime, D: Downloader> {
    runtime: R,
    downloader: D,
    cache_root: PathBuf,
    cleanup_ctx: SharedCleanupContext,
}

impl<R: Runtime, D: Downloader> CacheManager<R, D> {
    pub fn new(
        runtime: R,
        downloader: D,
        cache_root: PathBuf,
        cleanup_ctx: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            downloader,
            cache_root,
            cleanup_ctx,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn location_for(&self, id: &PackageId) -> PathBuf {
        self.cache_root.join(id.as_str())
    }

    fn staging_for(&self, id: &PackageId) -> PathBuf {
        self.cache_root.join(STAGING_DIR).join(id.as_str())
    }

    /// Make sure the content of `source` is cached for `id` and return its location.
    /// A present slot is reused without touching the network.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_into(&self, source: &str, id: &PackageId) -> Result<PathBuf> {
        let location = self.location_for(id);
        if self.runtime.exists(&location) {
            debug!("Cache hit for {} at {:?}", id, location);
            return Ok(location);
        }

        let staging = self.staging_for(id);
        if self.runtime.exists(&staging) {
            debug!("Removing stale staging directory {:?}", staging);
            self.runtime.remove_dir_all(&staging)?;
        }
        self.runtime.create_dir_all(&self.cache_root.join(STAGING_DIR))?;

        let guard = CleanupGuard::new(self.cleanup_ctx.clone(), staging.clone());

        info!("Downloading package {} from {}", id, source);
        let result = match self.downloader.fetch(source, &staging).await {
            Ok(_) => self.runtime.rename(&staging, &location),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if self.runtime.exists(&staging) {
                let _ = self.runtime.remove_dir_all(&staging);
            }
            guard.success();
            return Err(e);
        }
        guard.success();

        debug!("Package {} cached at {:?}", id, location);
        Ok(location)
    }

    /// Drop the cached copy of `id`. A missing slot is not an error.
    pub fn invalidate(&self, id: &PackageId) -> Result<()> {
        let location = self.location_for(id);
        if self.runtime.exists(&location) {
            debug!("Invalidating cache of {} at {:?}", id, location);
            self.runtime.remove_dir_all(&location)?;
        }
        Ok(())
    }

    /// Remove the whole cache. A missing cache root is not an error.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> Result<()> {
        if self.runtime.exists(&self.cache_root) {
            info!("Clearing package cache {:?}", self.cache_root);
            self.runtime.remove_dir_all(&self.cache_root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::{self, lock};
    use crate::download::MockDownloader;
    use crate::runtime::RealRuntime;
    use anyhow::anyhow;
    use tempfile::tempdir;

    fn id(s: &str) -> PackageId {
        s.parse().unwrap()
    }

    fn unpacking_downloader() -> MockDownloader {
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().times(1).returning(|_, destination| {
            std::fs::create_dir_all(destination).unwrap();
            std::fs::write(destination.join("dochub.yaml"), "$package: {}").unwrap();
            Ok(destination.to_path_buf())
        });
        downloader
    }

    #[tokio::test]
    async fn test_fetch_into_miss_downloads_and_renames() {
        let dir = tempdir().unwrap();
        let cleanup_ctx = cleanup::new_shared();
        let cache = CacheManager::new(
            RealRuntime,
            unpacking_downloader(),
            dir.path().join("cache"),
            cleanup_ctx.clone(),
        );

        let location = cache
            .fetch_into("https://cdn/core.tgz", &id("core"))
            .await
            .unwrap();

        assert_eq!(location, dir.path().join("cache/core"));
        assert!(location.join("dochub.yaml").exists());
        assert!(!dir.path().join("cache/.staging/core").exists());
        assert!(lock(&cleanup_ctx).paths().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_into_hit_skips_download() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("core")).unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().never();
        let cache = CacheManager::new(
            RealRuntime,
            downloader,
            dir.path().to_path_buf(),
            cleanup::new_shared(),
        );

        let location = cache.fetch_into("https://cdn/core.tgz", &id("core")).await.unwrap();
        assert_eq!(location, dir.path().join("core"));
    }

    #[tokio::test]
    async fn test_fetch_into_removes_stale_staging() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".staging/core")).unwrap();
        std::fs::write(dir.path().join(".staging/core/leftover.yaml"), "old").unwrap();

        let cache = CacheManager::new(
            RealRuntime,
            unpacking_downloader(),
            dir.path().to_path_buf(),
            cleanup::new_shared(),
        );
        let location = cache.fetch_into("https://cdn/core.tgz", &id("core")).await.unwrap();

        assert!(!location.join("leftover.yaml").exists());
        assert!(location.join("dochub.yaml").exists());
    }

    #[tokio::test]
    async fn test_fetch_into_failure_leaves_no_slot() {
        let dir = tempdir().unwrap();
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().returning(|_, destination| {
            // Partial content before the transport fails
            std::fs::create_dir_all(destination).unwrap();
            Err(anyhow!("connection reset"))
        });
        let cleanup_ctx = cleanup::new_shared();
        let cache = CacheManager::new(
            RealRuntime,
            downloader,
            dir.path().to_path_buf(),
            cleanup_ctx.clone(),
        );

        let err = cache
            .fetch_into("https://cdn/core.tgz", &id("core"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "connection reset");
        assert!(!dir.path().join("core").exists());
        assert!(!dir.path().join(".staging/core").exists());
        assert!(lock(&cleanup_ctx).paths().is_empty());
    }

    #[tokio::test]
    async fn test_staging_never_shares_a_path_with_a_slot() {
        let dir = tempdir().unwrap();
        // Complete slot of a package whose id looks like a staging name
        std::fs::create_dir_all(dir.path().join("core__")).unwrap();
        std::fs::write(dir.path().join("core__/dochub.yaml"), "$package: {}").unwrap();

        let cache = CacheManager::new(
            RealRuntime,
            unpacking_downloader(),
            dir.path().to_path_buf(),
            cleanup::new_shared(),
        );
        let location = cache.fetch_into("https://cdn/core.tgz", &id("core")).await.unwrap();

        assert_eq!(location, dir.path().join("core"));
        assert!(dir.path().join("core__/dochub.yaml").exists());
        assert_ne!(cache.staging_for(&id("core")), cache.location_for(&id("core__")));
    }

    #[tokio::test]
    async fn test_interrupted_staging_is_not_a_cache_hit() {
        let dir = tempdir().unwrap();
        // Left behind by a download killed before the rename
        std::fs::create_dir_all(dir.path().join(".staging/core")).unwrap();
        std::fs::write(dir.path().join(".staging/core/partial.bin"), "half").unwrap();

        let cache = CacheManager::new(
            RealRuntime,
            unpacking_downloader(),
            dir.path().to_path_buf(),
            cleanup::new_shared(),
        );
        let location = cache.fetch_into("https://cdn/core.tgz", &id("core")).await.unwrap();

        assert!(location.join("dochub.yaml").exists());
        assert!(!location.join("partial.bin").exists());
        assert!(".staging".parse::<PackageId>().is_err());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir_all(root.join("core")).unwrap();
        std::fs::create_dir_all(root.join("ui")).unwrap();

        let cache = CacheManager::new(
            RealRuntime,
            MockDownloader::new(),
            root.clone(),
            cleanup::new_shared(),
        );

        cache.invalidate(&id("core")).unwrap();
        assert!(!root.join("core").exists());
        assert!(root.join("ui").exists());

        // Missing slot and missing root are fine
        cache.invalidate(&id("core")).unwrap();
        cache.clear().unwrap();
        assert!(!root.exists());
        cache.clear().unwrap();
    }
}
