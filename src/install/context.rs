use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::error::PackageError;
use crate::index::InstalledIndex;
use crate::package::PackageId;

/// Longest chain of nested dependency resolutions in one run.
pub const MAX_RESOLUTION_DEPTH: usize = 64;

/// State of one command run: the installed index and the packages whose
/// resolution is in progress.
#[derive(Debug, Default)]
pub struct RunContext {
    index: InstalledIndex,
    in_flight: Vec<(PathBuf, PackageId)>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &InstalledIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut InstalledIndex {
        &mut self.index
    }

    /// Mark `(root, id)` as being resolved. Re-entering a pair that is already
    /// being resolved is a dependency cycle.
    pub(crate) fn enter(&mut self, root: &Path, id: &PackageId) -> Result<()> {
        if let Some(start) = self
            .in_flight
            .iter()
            .position(|(r, i)| r == root && i == id)
        {
            let packages = self.in_flight[start..]
                .iter()
                .map(|(_, id)| id.to_string())
                .collect();
            return Err(PackageError::CyclicDependency { packages }.into());
        }
        if self.in_flight.len() >= MAX_RESOLUTION_DEPTH {
            bail!(
                "Dependency chain of {} is deeper than {} packages",
                id,
                MAX_RESOLUTION_DEPTH
            );
        }
        self.in_flight.push((root.to_path_buf(), id.clone()));
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.in_flight.pop();
    }

    pub fn depth(&self) -> usize {
        self.in_flight.len()
    }
}
