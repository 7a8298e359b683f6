//! # Git Provider Client
//!
//! Pull request lifecycle against GitHub, GitLab and Bitbucket.
//!
//! The provider set is closed: [`ProviderClient`] is an enum with one client per
//! provider, each implementing [`GitProviderApi`]. Provider detection and API
//! base resolution happen once per reconciliation in [`ProviderClient::for_repository`].

pub mod bitbucket;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod types;

pub use bitbucket::BitbucketClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use http::{build_http_client, ApiClient};
pub use paths::Provider;
pub use types::{CreatePullRequest, ProviderError, PullRequest, PullRequestState};

use crate::controller::gitops::credentials::Credentials;
use crate::controller::gitops::sanitize::sanitize;
use crate::crd::GitRepositoryConfig;
use crate::observability::metrics::GitOpsMetrics;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;

/// Pull request operations every provider supports
#[async_trait]
pub trait GitProviderApi: Send + Sync {
    fn provider(&self) -> Provider;

    /// Open a pull request
    async fn create_pull_request(
        &self,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, ProviderError>;

    /// Open pull request whose source is `branch`, if any
    async fn find_pull_request_by_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequest>, ProviderError>;

    /// Pull request by number, `None` if the provider does not know it
    async fn get_pull_request(&self, number: u64) -> Result<Option<PullRequest>, ProviderError>;

    /// Merge a pull request
    ///
    /// Merging an already merged pull request may fail; callers that only need
    /// mergedness treat that as non-fatal.
    async fn merge_pull_request(&self, number: u64) -> Result<(), ProviderError>;

    /// Delete a branch; a branch that does not exist counts as deleted
    async fn delete_branch(&self, branch: &str) -> Result<(), ProviderError>;
}

/// Client for the repository's provider
#[derive(Debug, Clone)]
pub enum ProviderClient {
    GitHub(GitHubClient),
    GitLab(GitLabClient),
    Bitbucket(BitbucketClient),
}

impl ProviderClient {
    /// Detect the provider, resolve its API base and build the matching client
    ///
    /// `http` is used unless the repository disables TLS verification, in which
    /// case a dedicated client is built with the same timeout.
    pub fn for_repository(
        repo: &GitRepositoryConfig,
        credentials: &Credentials,
        http: reqwest::Client,
        timeout: std::time::Duration,
        metrics: Arc<GitOpsMetrics>,
    ) -> Result<Self, ProviderError> {
        let location = RepositoryLocation::parse(&repo.url)?;
        let provider = detect_provider(repo.provider.as_deref(), &location)?;
        let api_base = resolve_api_base(provider, repo.api_base_url.as_deref(), &location)?;
        let http = if repo.tls_verify {
            http
        } else {
            build_http_client(timeout, false)?
        };
        let api = ApiClient::new(
            provider,
            api_base,
            location.repository_path(provider),
            http,
            credentials.clone(),
            metrics,
        );
        Ok(match provider {
            Provider::GitHub => ProviderClient::GitHub(GitHubClient::new(api)),
            Provider::GitLab => ProviderClient::GitLab(GitLabClient::new(api)),
            Provider::Bitbucket => ProviderClient::Bitbucket(BitbucketClient::new(api)),
        })
    }

    fn inner(&self) -> &dyn GitProviderApi {
        match self {
            ProviderClient::GitHub(client) => client,
            ProviderClient::GitLab(client) => client,
            ProviderClient::Bitbucket(client) => client,
        }
    }
}

#[async_trait]
impl GitProviderApi for ProviderClient {
    fn provider(&self) -> Provider {
        self.inner().provider()
    }

    async fn create_pull_request(
        &self,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, ProviderError> {
        self.inner().create_pull_request(request).await
    }

    async fn find_pull_request_by_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequest>, ProviderError> {
        self.inner().find_pull_request_by_branch(branch).await
    }

    async fn get_pull_request(&self, number: u64) -> Result<Option<PullRequest>, ProviderError> {
        self.inner().get_pull_request(number).await
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), ProviderError> {
        self.inner().merge_pull_request(number).await
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), ProviderError> {
        self.inner().delete_branch(branch).await
    }
}

/// Host and path of a repository clone URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Path without leading/trailing `/` and without a `.git` suffix
    pub path: String,
}

impl RepositoryLocation {
    /// Parse an `http(s)://`, `ssh://`, `file://` or scp-style (`git@host:owner/repo`) URL
    pub fn parse(url: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::InvalidUrl(sanitize(None, url));
        let trimmed = url.trim();

        if trimmed.contains("://") {
            let parsed = Url::parse(trimmed).map_err(|_| invalid())?;
            let path = clean_path(parsed.path());
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                scheme: parsed.scheme().to_string(),
                host: parsed.host_str().map(str::to_ascii_lowercase),
                port: parsed.port(),
                path,
            });
        }

        // scp-like syntax: [user@]host:path
        let (host_part, path) = trimmed.split_once(':').ok_or_else(invalid)?;
        let host = host_part
            .rsplit_once('@')
            .map_or(host_part, |(_, host)| host);
        let path = clean_path(path);
        if host.is_empty() || path.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme: "https".to_string(),
            host: Some(host.to_ascii_lowercase()),
            port: None,
            path,
        })
    }

    /// Repository path as the provider's API addresses it
    ///
    /// GitLab takes the full (possibly nested) project path; GitHub and
    /// Bitbucket take the last two segments.
    #[must_use]
    pub fn repository_path(&self, provider: Provider) -> String {
        match provider {
            Provider::GitLab => self.path.clone(),
            Provider::GitHub | Provider::Bitbucket => {
                let parts: Vec<&str> = self.path.rsplitn(3, '/').collect();
                match parts.as_slice() {
                    [name, owner, ..] => format!("{owner}/{name}"),
                    _ => self.path.clone(),
                }
            }
        }
    }
}

fn clean_path(path: &str) -> String {
    let path = path.trim_matches('/');
    path.strip_suffix(".git").unwrap_or(path).to_string()
}

/// Explicit configuration wins; otherwise only the public hosted services are recognized
pub fn detect_provider(
    explicit: Option<&str>,
    location: &RepositoryLocation,
) -> Result<Provider, ProviderError> {
    if let Some(name) = explicit.filter(|p| !p.trim().is_empty()) {
        return Ok(name.parse::<Provider>()?);
    }
    let host = location.host.as_deref().unwrap_or_default();
    Provider::from_public_host(host).ok_or_else(|| ProviderError::ProviderRequired(host.to_string()))
}

/// Override, else the public endpoint, else `scheme://host[:port]` plus the self-hosted API path
pub fn resolve_api_base(
    provider: Provider,
    override_url: Option<&str>,
    location: &RepositoryLocation,
) -> Result<Url, ProviderError> {
    if let Some(base) = override_url.filter(|u| !u.trim().is_empty()) {
        return Url::parse(base.trim()).map_err(|_| ProviderError::InvalidUrl(sanitize(None, base)));
    }

    let host = location
        .host
        .as_deref()
        .ok_or_else(|| ProviderError::InvalidUrl(location.path.clone()))?;
    let base = if provider.is_public_host(host) {
        provider.public_api_base().to_string()
    } else {
        let scheme = match location.scheme.as_str() {
            "http" => "http",
            _ => "https",
        };
        let port = location.port.map(|p| format!(":{p}")).unwrap_or_default();
        format!("{scheme}://{host}{port}{}", provider.self_hosted_api_path())
    };
    Url::parse(&base).map_err(|_| ProviderError::InvalidUrl(base))
}
