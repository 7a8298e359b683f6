//! # Custom Resource Definitions
//!
//! CRD types for the NetworkPolicy GitOps controller.
//!
//! `NetworkPolicyGitOps` carries the desired namespace set and every setting
//! of the GitOps workflow in its spec, and the per-namespace pull request
//! lifecycle in its status.

mod provider;
mod status;

pub use provider::{GitRepositoryConfig, SecretRef};
pub use status::{Condition, NamespacePhase, NamespaceStatusEntry, NetworkPolicyGitOpsStatus};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkPolicyGitOps Custom Resource Definition
///
/// Renders NetworkPolicy templates for each listed namespace into a GitOps
/// repository and tracks the pull requests that carry them.
///
/// # Example
///
/// ```yaml
/// apiVersion: gitops.netpol.io/v1
/// kind: NetworkPolicyGitOps
/// metadata:
///   name: prod-policies
///   namespace: netpol-gitops-system
/// spec:
///   namespaces: [billing, payments]
///   excludeNamespaces: ["kube-.*"]
///   gitRepository:
///     url: https://github.com/acme/cluster-policies.git
///     clusterName: prod
///     credentialsSecretRef:
///       name: git-credentials
///       namespace: netpol-gitops-system
///   backupExisting: true
///   autoMerge:
///     enabled: true
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "NetworkPolicyGitOps",
    group = "gitops.netpol.io",
    version = "v1",
    namespaced,
    status = "NetworkPolicyGitOpsStatus",
    shortname = "npg",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.gitRepository.clusterName"}, {"name":"Last Reconcile", "type":"string", "jsonPath":".status.lastReconcileTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyGitOpsSpec {
    /// Desired namespaces, processed in this order
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Namespaces excluded from all network policy operations
    /// Each entry is an exact name or a regular expression (anchored)
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    /// GitOps repository the policies are committed to
    pub git_repository: GitRepositoryConfig,
    /// Directory inside the repository holding NetworkPolicy templates
    #[serde(default = "default_template_dir")]
    pub template_dir: String,
    /// Capture NetworkPolicies already present in the cluster into the repository
    #[serde(default)]
    pub backup_existing: bool,
    /// Namespaces never backed up (exact names or regular expressions)
    #[serde(default)]
    pub backup_exclude_namespaces: Vec<String>,
    /// Batching and rate-limit courtesy delays
    #[serde(default)]
    pub batch_processing: BatchProcessingConfig,
    /// Automatic merge of template-only pull requests
    #[serde(default)]
    pub auto_merge: AutoMergeConfig,
    /// Days a `removed` status entry is kept before it is pruned
    #[serde(default = "default_status_retention_days")]
    pub status_retention_days: u32,
    /// How often the periodic sweep (drift, template changes, stale PRs) runs
    /// Format: Kubernetes duration string (e.g., "30m", "1h")
    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval: String,
    /// Age after which an open pull request is flagged `pr-stale`
    #[serde(default = "default_stale_pr_threshold")]
    pub stale_pr_threshold: String,
}

/// Batch processing configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessingConfig {
    /// Namespaces per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Pause between namespaces within a batch (provider rate limits)
    #[serde(default = "default_sleep_between_namespaces")]
    pub sleep_between_namespaces: String,
    /// Pause between batches (lets pull-based GitOps appliers catch up)
    #[serde(default = "default_sleep_between_batches")]
    pub sleep_between_batches: String,
}

impl Default for BatchProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sleep_between_namespaces: default_sleep_between_namespaces(),
            sleep_between_batches: default_sleep_between_batches(),
        }
    }
}

/// Auto-merge configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoMergeConfig {
    /// Merge pull requests that only add template-rendered policies
    /// Backups always require a manual merge
    #[serde(default)]
    pub enabled: bool,
    /// Label attached to auto-merged pull requests
    #[serde(default = "default_merge_label")]
    pub label: String,
    /// Pause before the merge attempt so the provider can compute mergeability
    #[serde(default = "default_wait_before_merge")]
    pub wait_before_merge: String,
}

impl Default for AutoMergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            label: default_merge_label(),
            wait_before_merge: default_wait_before_merge(),
        }
    }
}

fn default_template_dir() -> String {
    "networkpolicies/templates".to_string()
}

fn default_status_retention_days() -> u32 {
    30
}

fn default_reconciliation_interval() -> String {
    "1h".to_string()
}

fn default_stale_pr_threshold() -> String {
    "30d".to_string()
}

fn default_batch_size() -> u32 {
    5
}

fn default_sleep_between_namespaces() -> String {
    "3s".to_string()
}

fn default_sleep_between_batches() -> String {
    "60s".to_string()
}

fn default_merge_label() -> String {
    "auto-merge".to_string()
}

fn default_wait_before_merge() -> String {
    "5s".to_string()
}
