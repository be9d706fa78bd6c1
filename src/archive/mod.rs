mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors.
///
/// Package archives wrap their content in a single top-level folder, so
/// extractors drop the first path component of every entry.
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle an archive starting with `header`
    fn can_handle(&self, header: &[u8]) -> bool;

    /// Extract the archive to the specified directory
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor from the archive's magic bytes.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, header: &[u8]) -> bool {
        self.tar_gz.can_handle(header) || self.zip.can_handle(header)
    }

    #[tracing::instrument(skip(self, runtime, archive_path, extract_to))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        let header = read_header(runtime, archive_path)?;
        if self.tar_gz.can_handle(&header) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(&header) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

fn read_header<R: Runtime>(runtime: &R, archive_path: &Path) -> Result<Vec<u8>> {
    let reader = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
    let mut header = Vec::with_capacity(4);
    reader
        .take(4)
        .read_to_end(&mut header)
        .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
    Ok(header)
}

/// Entry path relative to the extraction directory, without its top-level folder.
/// `None` for the folder itself and for paths escaping the destination.
pub(crate) fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut stripped = PathBuf::new();
    let mut skipped = false;
    for component in path.components() {
        match component {
            Component::Normal(part) if skipped => stripped.push(part),
            Component::Normal(_) => skipped = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use anyhow::Result;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::{self, File};
    use tar::Builder;
    use tempfile::tempdir;

    fn create_test_archive(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let file = File::create(path)?;
        let enc = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(enc);

        for (f, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(f)?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, content.as_bytes())?;
        }

        tar.into_inner()?.finish()?;
        Ok(())
    }

    fn create_test_zip_archive(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        use ::zip::CompressionMethod;
        use ::zip::ZipWriter;
        use ::zip::write::FileOptions;
        use std::io::Write;

        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_extractor_impl_can_handle_magic_bytes() {
        let extractor = ArchiveExtractorImpl::new();
        assert!(extractor.can_handle(&[0x1f, 0x8b, 0x08, 0x00]));
        assert!(extractor.can_handle(b"PK\x03\x04"));
        assert!(!extractor.can_handle(b"<htm"));
        assert!(!extractor.can_handle(&[]));
    }

    #[test]
    fn test_extractor_impl_dispatches_to_tar_gz() -> Result<()> {
        let dir = tempdir()?;
        // The name does not matter, only the content
        let archive_path = dir.path().join("download");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_archive(&archive_path, &[("package/dochub.yaml", "test content")])?;

        let extractor = ArchiveExtractorImpl::new();
        extractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        let extracted_file = extract_path.join("dochub.yaml");
        assert_eq!(fs::read_to_string(extracted_file)?, "test content");

        Ok(())
    }

    #[test]
    fn test_extractor_impl_dispatches_to_zip() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("download");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_zip_archive(
            &archive_path,
            &[("package/dochub.yaml", "test content from zip")],
        )?;

        let extractor = ArchiveExtractorImpl::new();
        extractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        let extracted_file = extract_path.join("dochub.yaml");
        assert_eq!(fs::read_to_string(extracted_file)?, "test content from zip");

        Ok(())
    }

    #[test]
    fn test_extractor_impl_unsupported_format() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("download");
        fs::write(&archive_path, "<html>Not found</html>").unwrap();

        let extractor = ArchiveExtractorImpl::new();
        let result = extractor.extract(&RealRuntime, &archive_path, &dir.path().join("out"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported archive format")
        );
    }

    #[test]
    fn test_strip_top_level() {
        assert_eq!(
            strip_top_level(Path::new("package/models/a.yaml")),
            Some(PathBuf::from("models/a.yaml"))
        );
        assert_eq!(
            strip_top_level(Path::new("./package/a.yaml")),
            Some(PathBuf::from("a.yaml"))
        );
        assert_eq!(strip_top_level(Path::new("package/")), None);
        assert_eq!(strip_top_level(Path::new("package/../../etc/passwd")), None);
        assert_eq!(strip_top_level(Path::new("/abs/file")), None);
    }
}
