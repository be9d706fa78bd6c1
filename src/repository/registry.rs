use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::http::HttpClient;
use crate::package::PackageSpec;

use super::{PackageSource, RepositoryClient, ResolvedPackage};

pub const DEFAULT_REPO_SERVER: &str = "https://registry.dochub.info/";

const GUEST_TOKEN_ROUTE: [&str; 3] = ["session", "guest", "token"];
const DOWNLOAD_ROUTE: [&str; 2] = ["repo", "download"];
const BUILT_IN_SOURCE: &str = "built-in";

/// Ranges travel in the last path segment (`id@^1.0.0`).
const REQUEST_SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@');

#[derive(Debug, Deserialize)]
struct GuestToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct DownloadInfo {
    version: String,
    source: String,
}

/// Client of the package registry HTTP API.
///
/// A guest session token is requested on first use and reused for the
/// lifetime of the client.
pub struct RegistryClient {
    http_client: HttpClient,
    server: Url,
    token: OnceCell<String>,
}

impl RegistryClient {
    pub fn new(http_client: HttpClient, server: &str) -> Result<Self> {
        let server =
            Url::parse(server).with_context(|| format!("Invalid repository server '{}'", server))?;
        if server.cannot_be_a_base() {
            return Err(anyhow!("Invalid repository server '{}'", server));
        }
        Ok(Self {
            http_client,
            server,
            token: OnceCell::new(),
        })
    }

    fn route(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid repository server '{}'", self.server))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn access_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let url = self.route(&GUEST_TOKEN_ROUTE)?;
                debug!("Requesting guest access token from {}", url);
                let response: GuestToken = self
                    .http_client
                    .get_json_with(url.as_str(), None, Some(StatusCode::CREATED))
                    .await
                    .context("Failed to get access to the repository")?;
                info!("Access token provided");
                Ok::<_, anyhow::Error>(response.token)
            })
            .await?;
        Ok(token.as_str())
    }
}

#[async_trait]
impl RepositoryClient for RegistryClient {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, spec: &PackageSpec) -> Result<ResolvedPackage> {
        let token = self.access_token().await?;

        let mut url = self.route(&DOWNLOAD_ROUTE)?;
        let path = format!(
            "{}/{}",
            url.path(),
            utf8_percent_encode(&spec.to_string(), REQUEST_SEGMENT_SET)
        );
        url.set_path(&path);

        debug!("Resolving {} via {}", spec, url);
        let info: DownloadInfo = self
            .http_client
            .get_json_with(url.as_str(), Some(token), Some(StatusCode::OK))
            .await
            .with_context(|| format!("Failed to resolve the download link of package {}", spec))?;

        let source = if info.source == BUILT_IN_SOURCE {
            PackageSource::BuiltIn
        } else {
            PackageSource::Remote(info.source)
        };
        info!("Package {} resolved to version {}", spec, info.version);
        Ok(ResolvedPackage {
            version: info.version,
            source,
        })
    }
}
