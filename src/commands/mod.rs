use anyhow::Result;
use log::{info, warn};
use std::path::Path;
use tokio::task::JoinHandle;

use crate::{
    cleanup::{self, SharedCleanupContext},
    install::RunContext,
    manifest::{
        MANIFEST_FILE, add_dependency_to_manifest, add_import_to_manifest, make_imports_file,
    },
    package::{PackageId, PackageSpec},
    runtime::Runtime,
};

pub mod config;
pub mod services;

use config::Config;
use services::{Manager, build_package_manager};

/// Install one package into the installation root, or every dependency of
/// the project when `spec` is `None`.
#[tracing::instrument(skip(runtime, config))]
pub async fn install<R: Runtime + Clone + 'static>(
    runtime: R,
    config: Config,
    spec: Option<&str>,
    auto_import: bool,
) -> Result<()> {
    let spec = spec.map(str::parse::<PackageSpec>).transpose()?;

    let cleanup_ctx = cleanup::new_shared();
    let manager = build_package_manager(runtime, &config, cleanup_ctx.clone())?;

    let ctrl_c_handler = spawn_interrupt_handler(cleanup_ctx);
    let result = run_install(&manager, &config, spec.as_ref(), auto_import).await;
    ctrl_c_handler.abort();

    end_run(&manager, &config);
    result
}

async fn run_install<R: Runtime + Clone + 'static>(
    manager: &Manager<R>,
    config: &Config,
    spec: Option<&PackageSpec>,
    auto_import: bool,
) -> Result<()> {
    let runtime = manager.runtime();
    let manifest_path = config.project_dir.join(MANIFEST_FILE);
    let mut ctx = RunContext::new();

    match spec {
        Some(spec) => {
            println!("Installing {}...", spec);
            let version = manager
                .specific_install(&mut ctx, &config.install_root, &spec.id, &spec.request)
                .await?;
            let range = match spec.request.as_range() {
                Some(range) => range.to_string(),
                None => format!("^{}", version),
            };
            add_dependency_to_manifest(runtime, &manifest_path, spec.id.as_str(), &range, None)?;
            println!("Package {}@{} installed", spec.id, version);
        }
        None => {
            println!("Installing dependencies of {:?}...", config.project_dir);
            manager
                .all_install(&mut ctx, &config.project_dir, &config.install_root)
                .await?;
            println!("All dependencies installed");
        }
    }

    let imports = make_imports_file(runtime, ctx.index_mut(), &config.install_root)?;
    if auto_import {
        let link = import_link(&config.project_dir, &imports);
        add_import_to_manifest(runtime, &manifest_path, &link)?;
        info!("Registered {} in {:?}", link, manifest_path);
    }
    Ok(())
}

/// Remove one package from the installation root. Packages depending on it stay.
#[tracing::instrument(skip(runtime, config))]
pub async fn remove<R: Runtime + Clone + 'static>(
    runtime: R,
    config: Config,
    package: &str,
) -> Result<()> {
    let id: PackageId = package.parse()?;
    let manager = build_package_manager(runtime, &config, cleanup::new_shared())?;
    let mut ctx = RunContext::new();

    let source = manager.remove_package_from(&mut ctx, &config.install_root, &id)?;
    println!("Removed {} from {:?}", id, source);

    make_imports_file(manager.runtime(), ctx.index_mut(), &config.install_root)?;
    Ok(())
}

/// Delete the package cache.
#[tracing::instrument(skip(runtime, config))]
pub async fn clean<R: Runtime + Clone + 'static>(runtime: R, config: Config) -> Result<()> {
    let manager = build_package_manager(runtime, &config, cleanup::new_shared())?;
    manager.cache().clear()?;
    println!("Cache {:?} cleared", config.cache_dir);
    Ok(())
}

fn spawn_interrupt_handler(cleanup_ctx: SharedCleanupContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            cleanup::lock(&cleanup_ctx).cleanup();
            std::process::exit(130); // Standard exit code for Ctrl-C
        }
    })
}

/// The cache only lives for one run unless asked to keep it.
fn end_run<R: Runtime + Clone + 'static>(manager: &Manager<R>, config: &Config) {
    if config.keep_cache {
        return;
    }
    if let Err(e) = manager.cache().clear() {
        warn!("Failed to clear cache {:?}: {}", config.cache_dir, e);
    }
}

/// Path of the imports file as written into the project manifest: relative to
/// the project with `/` separators when possible, absolute otherwise.
fn import_link(project_dir: &Path, imports: &Path) -> String {
    match imports.strip_prefix(project_dir) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => imports.to_string_lossy().into_owned(),
    }
}
