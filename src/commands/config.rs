use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::repository::DEFAULT_REPO_SERVER;
use crate::runtime::Runtime;

/// Installation root created inside the project when none is given.
pub const DEFAULT_ROOT_DIR: &str = "_metamodel_";

const CACHE_DIR_NAME: &str = "archpkg";

/// Command line options that override the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub repo_server: Option<String>,
    pub ca_cert: Option<PathBuf>,
    pub keep_cache: bool,
}

/// Settings of one command run, with every path made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub project_dir: PathBuf,
    pub install_root: PathBuf,
    pub cache_dir: PathBuf,
    pub repo_server: String,
    pub ca_cert: Option<PathBuf>,
    pub keep_cache: bool,
}

impl Config {
    pub fn load<R: Runtime>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let cwd = runtime
            .current_dir()
            .context("Failed to determine the current directory")?;

        let project_dir = match overrides.project {
            Some(path) => absolute(&cwd, path),
            None => cwd.clone(),
        };
        let install_root = match overrides.install_root {
            Some(path) => absolute(&cwd, path),
            None => project_dir.join(DEFAULT_ROOT_DIR),
        };
        let cache_dir = match overrides.cache {
            Some(path) => absolute(&cwd, path),
            None => runtime
                .cache_dir()
                .unwrap_or_else(|| runtime.temp_dir())
                .join(CACHE_DIR_NAME),
        };

        let config = Self {
            project_dir,
            install_root,
            cache_dir,
            repo_server: overrides
                .repo_server
                .unwrap_or_else(|| DEFAULT_REPO_SERVER.to_string()),
            ca_cert: overrides.ca_cert.map(|path| absolute(&cwd, path)),
            keep_cache: overrides.keep_cache,
        };
        debug!("Using configuration: {:?}", config);
        Ok(config)
    }
}

fn absolute(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
