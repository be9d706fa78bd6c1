//! Installed index: what is installed under each installation root.
//!
//! A root is scanned lazily on the first query and then only changes through
//! [`InstalledIndex::record_install`] and [`InstalledIndex::record_removal`].
//! Changes made on disk by someone else during the run are not observed.

use anyhow::{Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};

use crate::manifest::{PackageMetadata, SubPackage, read_metadata};
use crate::runtime::Runtime;

/// One installed package directory with the metadata read from its manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledEntry {
    pub source: PathBuf,
    pub metadata: PackageMetadata,
}

#[derive(Debug, Default)]
pub struct InstalledIndex {
    roots: Vec<(PathBuf, Vec<InstalledEntry>)>,
}

impl InstalledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the immediate subdirectories of `root`, sorted. A missing root is empty.
    pub fn scan<R: Runtime>(runtime: &R, root: &Path) -> Result<Vec<String>> {
        if !runtime.exists(root) {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = runtime
            .read_dir(root)?
            .into_iter()
            .filter(|path| runtime.is_dir(path))
            .filter_map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Entries installed under `root`. The first call reads every manifest.
    #[tracing::instrument(skip(self, runtime))]
    pub fn fetch<R: Runtime>(&mut self, runtime: &R, root: &Path) -> Result<&[InstalledEntry]> {
        let position = match self.position(root) {
            Some(position) => position,
            None => {
                let mut entries = Vec::new();
                for name in Self::scan(runtime, root)? {
                    let source = root.join(&name);
                    let metadata = read_metadata(runtime, &source)?;
                    entries.push(InstalledEntry { source, metadata });
                }
                debug!("Indexed {} package(s) in {:?}", entries.len(), root);
                self.roots.push((root.to_path_buf(), entries));
                self.roots.len() - 1
            }
        };
        Ok(&self.roots[position].1)
    }

    /// First entry under `root` that declares `sub_id`.
    pub fn find<R: Runtime>(
        &mut self,
        runtime: &R,
        root: &Path,
        sub_id: &str,
    ) -> Result<Option<(&InstalledEntry, &SubPackage)>> {
        let entries = self.fetch(runtime, root)?;
        Ok(entries.iter().find_map(|entry| {
            entry
                .metadata
                .get(sub_id)
                .map(|sub_package| (entry, sub_package))
        }))
    }

    /// Declared version of `sub_id` under `root`, if installed.
    pub fn installed_version<R: Runtime>(
        &mut self,
        runtime: &R,
        root: &Path,
        sub_id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .find(runtime, root, sub_id)?
            .and_then(|(_, sub_package)| sub_package.version.clone()))
    }

    pub fn record_install(&mut self, root: &Path, entry: InstalledEntry) -> Result<()> {
        let position = self
            .position(root)
            .ok_or_else(|| anyhow!("Installation root {:?} has not been indexed", root))?;
        debug!("Recording install of {:?}", entry.source);
        self.roots[position].1.push(entry);
        Ok(())
    }

    /// Drop the entry whose `source` is `source`. Returns whether one was removed.
    pub fn record_removal(&mut self, root: &Path, source: &Path) -> bool {
        let Some(position) = self.position(root) else {
            return false;
        };
        let entries = &mut self.roots[position].1;
        let before = entries.len();
        entries.retain(|entry| entry.source != source);
        before != entries.len()
    }

    /// Every root indexed so far, in priming order.
    pub fn roots(&self) -> impl Iterator<Item = (&Path, &[InstalledEntry])> {
        self.roots
            .iter()
            .map(|(root, entries)| (root.as_path(), entries.as_slice()))
    }

    pub fn is_primed(&self, root: &Path) -> bool {
        self.position(root).is_some()
    }

    /// Forget every root, as at the start of a new run.
    pub fn reset(&mut self) {
        self.roots.clear();
    }

    fn position(&self, root: &Path) -> Option<usize> {
        self.roots.iter().position(|(known, _)| known == root)
    }
}
