//! # Git Hosting Providers
//!
//! The closed set of supported Git hosting providers.

use crate::errors::PathBuilderError;
use std::fmt;
use std::str::FromStr;

/// Git hosting provider
///
/// Each provider speaks its own REST dialect for the pull request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// GitHub.com or GitHub Enterprise Server
    GitHub,
    /// GitLab.com or self-managed GitLab
    GitLab,
    /// Bitbucket Cloud (2.0 API dialect)
    Bitbucket,
}

impl Provider {
    /// All supported providers
    pub const ALL: [Provider; 3] = [Provider::GitHub, Provider::GitLab, Provider::Bitbucket];

    /// Lowercase identifier used in configuration and metric labels
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
        }
    }

    /// API endpoint of the public hosted service
    #[must_use]
    pub fn public_api_base(&self) -> &'static str {
        match self {
            Provider::GitHub => "https://api.github.com",
            Provider::GitLab => "https://gitlab.com/api/v4",
            Provider::Bitbucket => "https://api.bitbucket.org/2.0",
        }
    }

    /// Conventional API path of a self-hosted installation, appended to `scheme://host`
    #[must_use]
    pub fn self_hosted_api_path(&self) -> &'static str {
        match self {
            Provider::GitHub => "/api/v3",
            Provider::GitLab => "/api/v4",
            Provider::Bitbucket => "/api/2.0",
        }
    }

    /// Public hostname of the hosted service, if the host matches one
    ///
    /// GitLab also matches `gitlab.<anything>` since GitLab-operated domains
    /// follow that shape.
    #[must_use]
    pub fn from_public_host(host: &str) -> Option<Provider> {
        let host = host.to_ascii_lowercase();
        if host == "github.com" || host == "www.github.com" {
            Some(Provider::GitHub)
        } else if host == "gitlab.com" || host.starts_with("gitlab.") {
            Some(Provider::GitLab)
        } else if host == "bitbucket.org" || host == "www.bitbucket.org" {
            Some(Provider::Bitbucket)
        } else {
            None
        }
    }

    /// Whether the given host is the provider's public hosted service
    #[must_use]
    pub fn is_public_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Provider::GitHub => host == "github.com" || host == "www.github.com",
            Provider::GitLab => host == "gitlab.com",
            Provider::Bitbucket => host == "bitbucket.org" || host == "www.bitbucket.org",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PathBuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::GitHub),
            "gitlab" => Ok(Provider::GitLab),
            "bitbucket" => Ok(Provider::Bitbucket),
            other => Err(PathBuilderError::UnknownProvider(other.to_string())),
        }
    }
}
