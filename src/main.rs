use anyhow::Result;
use archpkg::commands::{
    self,
    config::{Config, ConfigOverrides},
};
use clap::Parser;
use std::path::PathBuf;

/// archpkg - architecture model package manager
///
/// Resolve packages with their dependencies from the package registry and
/// install them into the project's installation root, together with a
/// generated packages.yaml importing every installed manifest.
///
/// Examples:
///   archpkg install                   # Install every dependency of the project
///   archpkg install dochub@^3.0.0     # Install one package and record it
///   archpkg remove dochub             # Remove an installed package
#[derive(Parser, Debug)]
#[command(author, version = env!("ARCHPKG_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding dochub.yaml (defaults to the current directory)
    #[arg(
        long = "project",
        short = 'p',
        env = "ARCHPKG_PROJECT",
        value_name = "PATH",
        global = true
    )]
    pub project: Option<PathBuf>,

    /// Installation root (defaults to <project>/_metamodel_)
    #[arg(
        long = "root",
        short = 'r',
        env = "ARCHPKG_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Package cache directory
    #[arg(long = "cache", env = "ARCHPKG_CACHE", value_name = "PATH", global = true)]
    pub cache: Option<PathBuf>,

    /// Package registry URL (defaults to https://registry.dochub.info/)
    #[arg(
        long = "repo-server",
        env = "ARCHPKG_REPO_SERVER",
        value_name = "URL",
        global = true
    )]
    pub repo_server: Option<String>,

    /// Extra CA certificate (PEM) trusted for the registry and downloads
    #[arg(long = "ca-cert", env = "ARCHPKG_CA_CERT", value_name = "PATH", global = true)]
    pub ca_cert: Option<PathBuf>,

    /// Keep the package cache after the run
    #[arg(long = "keep-cache", global = true)]
    pub keep_cache: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package, or every dependency of the project
    Install(InstallArgs),

    /// Remove an installed package
    Remove(RemoveArgs),

    /// Delete the package cache
    Clean,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package to install, in the format "id" or "id@range"
    #[arg(value_name = "ID[@RANGE]")]
    pub spec: Option<String>,

    /// Register the generated packages.yaml in the project manifest
    #[arg(long = "auto-import")]
    pub auto_import: bool,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Package id
    #[arg(value_name = "ID")]
    pub id: String,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project: self.project.clone(),
            install_root: self.install_root.clone(),
            cache: self.cache.clone(),
            repo_server: self.repo_server.clone(),
            ca_cert: self.ca_cert.clone(),
            keep_cache: self.keep_cache,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = archpkg::runtime::RealRuntime;
    let config = Config::load(&runtime, cli.overrides())?;

    match cli.command {
        Commands::Install(args) => {
            commands::install(runtime, config, args.spec.as_deref(), args.auto_import).await?
        }
        Commands::Remove(args) => commands::remove(runtime, config, &args.id).await?,
        Commands::Clean => commands::clean(runtime, config).await?,
    }
    Ok(())
}
