use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::Path;
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, strip_top_level};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extractor for .tar.gz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, header: &[u8]) -> bool {
        header.starts_with(&GZIP_MAGIC)
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(GzDecoder::new(file));

        runtime.create_dir_all(extract_to)?;

        let mut extracted = 0usize;
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read tar entry")?;
            let entry_path = entry.path().context("Invalid path in tar entry")?.into_owned();

            let Some(relative) = strip_top_level(&entry_path) else {
                debug!("Skipping entry {:?}", entry_path);
                continue;
            };
            let full_path = extract_to.join(&relative);

            match entry.header().entry_type() {
                EntryType::Directory => {
                    runtime.create_dir_all(&full_path)?;
                }
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut dest_file = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest_file)
                        .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                    drop(dest_file);

                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                    extracted += 1;
                }
                other => {
                    debug!("Skipping {:?} entry {:?}", other, entry_path);
                }
            }
        }

        if extracted == 0 {
            return Err(anyhow!("Archive appears to be empty."));
        }

        info!("Extraction complete.");
        Ok(())
    }
}
