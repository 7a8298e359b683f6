//! # Git Repository Configuration
//!
//! Descriptor of the GitOps repository and its credentials.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GitOps repository descriptor
///
/// Immutable for the duration of a reconciliation cycle.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryConfig {
    /// Clone URL (HTTP or HTTPS)
    pub url: String,
    /// Git hosting provider: github, gitlab, or bitbucket
    /// Inferred for github.com, gitlab.com and bitbucket.org; required for self-hosted installations
    #[serde(default)]
    pub provider: Option<String>,
    /// API base URL override (e.g., https://git.example.com/api/v3)
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Branch pull requests target
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Cluster name; selects `networkpolicies/<clusterName>/` in the repository
    pub cluster_name: String,
    /// Verify the server TLS certificate for git and API traffic
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    /// Secret holding `token` (required), `username` and `email` (optional)
    pub credentials_secret_ref: SecretRef,
}

/// Reference to a namespaced Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}
