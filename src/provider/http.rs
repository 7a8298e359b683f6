//! # Provider HTTP Plumbing
//!
//! Request construction, authentication headers and error mapping shared by
//! the provider clients.

use crate::controller::gitops::credentials::Credentials;
use crate::controller::gitops::sanitize::{is_rate_limit_message, sanitize};
use crate::observability::metrics::GitOpsMetrics;
use crate::provider::types::ProviderError;
use paths::{Operation, PathBuilder, Provider};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

const USER_AGENT: &str = concat!("netpol-gitops-controller/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used for provider API calls
pub fn build_http_client(timeout: Duration, tls_verify: bool) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!tls_verify)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

/// Authenticated access to one repository on one provider
#[derive(Clone)]
pub struct ApiClient {
    provider: Provider,
    api_base: Url,
    repository: String,
    http: Client,
    credentials: Credentials,
    metrics: Arc<GitOpsMetrics>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("provider", &self.provider)
            .field("api_base", &self.api_base.as_str())
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    #[must_use]
    pub fn new(
        provider: Provider,
        api_base: Url,
        repository: String,
        http: Client,
        credentials: Credentials,
        metrics: Arc<GitOpsMetrics>,
    ) -> Self {
        Self {
            provider,
            api_base,
            repository,
            http,
            credentials,
            metrics,
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Path builder preset with this client's provider and repository
    #[must_use]
    pub fn path(&self, operation: Operation) -> PathBuilder {
        PathBuilder::new(self.provider)
            .repository(self.repository.clone())
            .operation(operation)
    }

    /// Absolute URL for `builder`; every segment is percent-encoded on its own
    pub fn url(&self, builder: &PathBuilder) -> Result<Url, ProviderError> {
        let segments = builder.build_segments()?;
        let mut url = self.api_base.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| ProviderError::InvalidUrl(self.api_base.to_string()))?;
            parts.pop_if_empty();
            parts.extend(&segments);
        }
        Ok(url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    pub fn put(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.put(url))
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.delete(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            Provider::GitHub => request
                .bearer_auth(&self.credentials.token)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28"),
            Provider::GitLab => request.header("PRIVATE-TOKEN", &self.credentials.token),
            Provider::Bitbucket => request
                .bearer_auth(&self.credentials.token)
                .header("Accept", "application/json"),
        }
    }

    /// Send `request`; any non-2xx status is an error
    pub async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Response, ProviderError> {
        self.send_allowing(operation, request, &[])
            .await?
            .ok_or_else(|| ProviderError::Decode {
                provider: self.provider,
                operation,
                message: "no response".to_string(),
            })
    }

    /// Send `request`; statuses in `absent` yield `Ok(None)` instead of an error
    pub async fn send_allowing(
        &self,
        operation: Operation,
        request: RequestBuilder,
        absent: &[StatusCode],
    ) -> Result<Option<Response>, ProviderError> {
        let span = info_span!(
            "provider.request",
            provider = %self.provider,
            operation = %operation,
            repository = %self.repository
        );
        async {
            let response = request.send().await.map_err(|e| {
                self.metrics.increment_provider_errors(self.provider.as_str());
                ProviderError::Transport {
                    provider: self.provider,
                    operation,
                    message: sanitize(Some(&self.credentials), &e.to_string()),
                }
            })?;

            let status = response.status();
            if status.is_success() {
                debug!("{} {} -> {}", self.provider, operation, status);
                return Ok(Some(response));
            }
            if absent.contains(&status) {
                debug!("{} {} -> {} (treated as absent)", self.provider, operation, status);
                return Ok(None);
            }

            let body = response.text().await.unwrap_or_default();
            let mut message = sanitize(Some(&self.credentials), body.trim());
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }

            self.metrics.increment_provider_errors(self.provider.as_str());
            if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_message(&message) {
                self.metrics.increment_rate_limited(self.provider.as_str());
                warn!("{} rate limit hit during {}", self.provider, operation);
                return Err(ProviderError::RateLimited {
                    provider: self.provider,
                    operation,
                    message,
                });
            }
            Err(ProviderError::Http {
                provider: self.provider,
                operation,
                status: status.as_u16(),
                message,
            })
        }
        .instrument(span)
        .await
    }

    /// Decode a JSON response body
    pub async fn json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        response: Response,
    ) -> Result<T, ProviderError> {
        let body = response.bytes().await.map_err(|e| ProviderError::Transport {
            provider: self.provider,
            operation,
            message: sanitize(Some(&self.credentials), &e.to_string()),
        })?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode {
            provider: self.provider,
            operation,
            message: e.to_string(),
        })
    }
}
