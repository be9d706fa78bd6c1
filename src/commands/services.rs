//! Service factory for building the engine from a [`Config`].
//!
//! Construction of the HTTP client, registry client, downloader and cache is
//! kept out of the configuration itself. Services are built from its values.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Certificate, Client};
use std::path::Path;

use crate::{
    cache::CacheManager,
    cleanup::SharedCleanupContext,
    download::HttpDownloader,
    http::HttpClient,
    install::PackageManager,
    repository::RegistryClient,
    runtime::Runtime,
};

use super::config::Config;

const USER_AGENT: &str = "archpkg-cli";

/// Package manager wired to the registry and the HTTP downloader.
pub type Manager<R> = PackageManager<R, RegistryClient, HttpDownloader<R>>;

/// Build an HTTP client, trusting the extra CA certificate if one is given
pub fn build_http_client<R: Runtime>(runtime: &R, ca_cert: Option<&Path>) -> Result<HttpClient> {
    let mut builder = Client::builder().user_agent(USER_AGENT);

    if let Some(path) = ca_cert {
        let pem = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read CA certificate {:?}", path))?;
        let certificate = Certificate::from_pem(pem.as_bytes())
            .with_context(|| format!("Invalid CA certificate {:?}", path))?;
        builder = builder.add_root_certificate(certificate);
        debug!("HTTP client trusts extra CA certificate {:?}", path);
    }

    Ok(HttpClient::new(builder.build()?))
}

/// Build the registry client from configuration
pub fn build_registry(http_client: HttpClient, config: &Config) -> Result<RegistryClient> {
    RegistryClient::new(http_client, &config.repo_server)
}

/// Build the package manager and everything it depends on
pub fn build_package_manager<R: Runtime + Clone + 'static>(
    runtime: R,
    config: &Config,
    cleanup_ctx: SharedCleanupContext,
) -> Result<Manager<R>> {
    let http_client = build_http_client(&runtime, config.ca_cert.as_deref())?;
    let registry = build_registry(http_client.clone(), config)?;
    let downloader = HttpDownloader::new(runtime.clone(), http_client, cleanup_ctx.clone());
    let cache = CacheManager::new(
        runtime.clone(),
        downloader,
        config.cache_dir.clone(),
        cleanup_ctx,
    );
    Ok(PackageManager::new(runtime, registry, cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockito::{Matcher, Server};
    use std::path::PathBuf;

    fn config(repo_server: &str) -> Config {
        Config {
            project_dir: PathBuf::from("/work"),
            install_root: PathBuf::from("/work/_metamodel_"),
            cache_dir: PathBuf::from("/cache/archpkg"),
            repo_server: repo_server.to_string(),
            ca_cert: None,
            keep_cache: false,
        }
    }

    #[tokio::test]
    async fn test_build_http_client_sets_user_agent() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/")
            .match_header("User-Agent", Matcher::Exact(USER_AGENT.to_string()))
            .with_body("{}")
            .create_async()
            .await;

        let http_client = build_http_client(&MockRuntime::new(), None).unwrap();
        let _: serde_json::Value = http_client
            .get_json_with(&server.url(), None, None)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_build_http_client_missing_certificate() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("No such file")));

        let err = build_http_client(&runtime, Some(Path::new("/etc/ca.pem"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read CA certificate"));
    }

    #[test]
    fn test_build_package_manager() {
        let manager = build_package_manager(
            RealRuntime,
            &config(crate::repository::DEFAULT_REPO_SERVER),
            cleanup::new_shared(),
        )
        .unwrap();
        assert_eq!(manager.cache().cache_root(), Path::new("/cache/archpkg"));
    }

    #[test]
    fn test_build_package_manager_invalid_server() {
        let result = build_package_manager(RealRuntime, &config("::"), cleanup::new_shared());
        assert!(result.is_err());
    }
}
