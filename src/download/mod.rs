//! Fetching package archives and unpacking them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, ArchiveExtractorImpl};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::http::HttpClient;
use crate::runtime::Runtime;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download the archive at `source` and unpack its content into `destination`.
    /// On failure nothing is left at `destination`.
    async fn fetch(&self, source: &str, destination: &Path) -> Result<PathBuf>;
}

/// Downloads a file from a URL to a temporary path with retry support.
#[tracing::instrument(skip(runtime, temp_path, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    temp_path: &Path,
    http_client: &HttpClient,
) -> Result<()> {
    info!("Downloading file from {}...", url);

    let temp_path = temp_path.to_path_buf();
    http_client
        .download_file(url, || {
            runtime
                .create_file(&temp_path)
                .with_context(|| format!("Failed to create temporary file at {:?}", temp_path))
        })
        .await?;

    info!("Download complete.");
    Ok(())
}

/// Downloader over HTTP. The archive is written next to the destination and
/// removed once unpacked.
pub struct HttpDownloader<R: Runtime, E: ArchiveExtractor = ArchiveExtractorImpl> {
    runtime: R,
    http_client: HttpClient,
    extractor: E,
    cleanup_ctx: SharedCleanupContext,
}

impl<R: Runtime> HttpDownloader<R, ArchiveExtractorImpl> {
    pub fn new(runtime: R, http_client: HttpClient, cleanup_ctx: SharedCleanupContext) -> Self {
        Self::with_extractor(runtime, http_client, ArchiveExtractorImpl::new(), cleanup_ctx)
    }
}

impl<R: Runtime, E: ArchiveExtractor> HttpDownloader<R, E> {
    pub fn with_extractor(
        runtime: R,
        http_client: HttpClient,
        extractor: E,
        cleanup_ctx: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            http_client,
            extractor,
            cleanup_ctx,
        }
    }

    fn remove_quietly(&self, path: &Path) {
        if !self.runtime.exists(path) {
            return;
        }
        let result = if self.runtime.is_dir(path) {
            self.runtime.remove_dir_all(path)
        } else {
            self.runtime.remove_file(path)
        };
        if let Err(e) = result {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

fn archive_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".archive");
    destination.with_file_name(name)
}

#[async_trait]
impl<R: Runtime + 'static, E: ArchiveExtractor> Downloader for HttpDownloader<R, E> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, source: &str, destination: &Path) -> Result<PathBuf> {
        let archive_path = archive_path_for(destination);
        self.remove_quietly(&archive_path);
        if let Some(parent) = archive_path.parent() {
            self.runtime.create_dir_all(parent)?;
        }

        let guard = CleanupGuard::new(self.cleanup_ctx.clone(), archive_path.clone());

        let result = async {
            download_file(&self.runtime, source, &archive_path, &self.http_client).await?;
            debug!("Unpacking {:?} into {:?}", archive_path, destination);
            self.extractor
                .extract(&self.runtime, &archive_path, destination)
                .with_context(|| format!("Failed to unpack package downloaded from {}", source))
        }
        .await;

        self.remove_quietly(&archive_path);
        guard.success();

        if let Err(e) = result {
            self.remove_quietly(destination);
            return Err(e);
        }
        Ok(destination.to_path_buf())
    }
}
