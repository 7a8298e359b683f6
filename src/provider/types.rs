//! # Provider Types
//!
//! Provider-neutral pull request records and errors.

use paths::{Operation, PathBuilderError, Provider};
use std::fmt;
use thiserror::Error;

/// Pull request state in a vocabulary shared by all providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestState {
    Open,
    Merged,
    Declined,
    /// Any state a provider reports that has no common equivalent (upper-cased)
    Other(String),
}

impl PullRequestState {
    /// Normalize a provider state string
    ///
    /// GitLab `opened` maps to `OPEN`; `closed` and `superseded` map to `DECLINED`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" | "OPENED" => PullRequestState::Open,
            "MERGED" => PullRequestState::Merged,
            "DECLINED" | "CLOSED" | "SUPERSEDED" => PullRequestState::Declined,
            other => PullRequestState::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            PullRequestState::Open => "OPEN",
            PullRequestState::Merged => "MERGED",
            PullRequestState::Declined => "DECLINED",
            PullRequestState::Other(s) => s,
        }
    }
}

impl fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized pull/merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub state: PullRequestState,
    pub url: String,
    pub source_branch: String,
}

impl PullRequest {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == PullRequestState::Open
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.state == PullRequestState::Merged
    }
}

/// Pull request to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePullRequest {
    pub title: String,
    pub description: String,
    pub source_branch: String,
    pub target_branch: String,
    pub labels: Vec<String>,
}

/// Errors from Git hosting API calls; all messages are sanitized
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} {operation} returned HTTP {status}: {message}")]
    Http {
        provider: Provider,
        operation: Operation,
        status: u16,
        message: String,
    },
    #[error("{provider} {operation} was rate limited: {message}")]
    RateLimited {
        provider: Provider,
        operation: Operation,
        message: String,
    },
    #[error("{provider} {operation} request failed: {message}")]
    Transport {
        provider: Provider,
        operation: Operation,
        message: String,
    },
    #[error("{provider} {operation} returned an unexpected response: {message}")]
    Decode {
        provider: Provider,
        operation: Operation,
        message: String,
    },
    #[error(transparent)]
    Path(#[from] PathBuilderError),
    #[error("invalid repository URL '{0}'")]
    InvalidUrl(String),
    #[error("cannot infer the git provider for host '{0}'; set gitRepository.provider for self-hosted installations")]
    ProviderRequired(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// HTTP status of the failed call, if the provider answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
