//! # NetworkPolicyGitOps Status
//!
//! Status types tracking the pull request lifecycle of every managed namespace.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the NetworkPolicyGitOps resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyGitOpsStatus {
    /// One entry per namespace, keyed by namespace name
    #[serde(default)]
    pub network_policies: Vec<NamespaceStatusEntry>,
    /// Last reconciliation cycle (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Last periodic sweep (RFC3339)
    #[serde(default)]
    pub last_periodic_sweep_time: Option<String>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl NetworkPolicyGitOpsStatus {
    #[must_use]
    pub fn entry(&self, namespace: &str) -> Option<&NamespaceStatusEntry> {
        self.network_policies
            .iter()
            .find(|e| e.namespace == namespace)
    }

    pub fn entry_mut(&mut self, namespace: &str) -> Option<&mut NamespaceStatusEntry> {
        self.network_policies
            .iter_mut()
            .find(|e| e.namespace == namespace)
    }

    /// Insert or replace the entry for `entry.namespace`
    /// Keeps at most one entry per namespace
    pub fn upsert(&mut self, entry: NamespaceStatusEntry) {
        self.network_policies
            .retain(|e| e.namespace != entry.namespace);
        self.network_policies.push(entry);
        self.network_policies
            .sort_by(|a, b| a.namespace.cmp(&b.namespace));
    }

    /// Replace the condition of the same type
    pub fn set_condition(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.r#type != condition.r#type);
        self.conditions.push(condition);
    }
}

/// Lifecycle state of a namespace's network policy pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NamespacePhase {
    /// Pull request opened; merge outcome not yet known
    PrCreated,
    /// Pull request open and waiting for review or merge
    PrPending,
    /// Pull request merged
    PrMerged,
    /// Pull request open longer than the stale threshold
    PrStale,
    /// Removal pull request opened for a namespace leaving the desired set
    PrRemoval,
    /// Namespace left the desired set; entry kept until the retention horizon
    Removed,
}

impl NamespacePhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespacePhase::PrCreated => "pr-created",
            NamespacePhase::PrPending => "pr-pending",
            NamespacePhase::PrMerged => "pr-merged",
            NamespacePhase::PrStale => "pr-stale",
            NamespacePhase::PrRemoval => "pr-removal",
            NamespacePhase::Removed => "removed",
        }
    }

    /// Pull request still open and awaiting merge
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            NamespacePhase::PrCreated | NamespacePhase::PrPending | NamespacePhase::PrStale
        )
    }
}

impl fmt::Display for NamespacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-namespace status entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStatusEntry {
    pub namespace: String,
    pub state: NamespacePhase,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub pr_branch: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    /// When the tracked pull request was created (RFC3339)
    #[serde(default)]
    pub created_at: Option<String>,
    /// When the namespace was marked removed (RFC3339)
    #[serde(default)]
    pub removed_at: Option<String>,
    /// Last error for this namespace, sanitized
    #[serde(default)]
    pub last_error: Option<String>,
    /// Whether the cluster no longer matches the repository
    #[serde(default)]
    pub drift_detected: Option<bool>,
    /// Last drift check (RFC3339)
    #[serde(default)]
    pub last_drift_check: Option<String>,
}

impl NamespaceStatusEntry {
    #[must_use]
    pub fn new(namespace: impl Into<String>, state: NamespacePhase) -> Self {
        Self {
            namespace: namespace.into(),
            state,
            pr_number: None,
            pr_branch: None,
            pr_url: None,
            created_at: None,
            removed_at: None,
            last_error: None,
            drift_detected: None,
            last_drift_check: None,
        }
    }

    #[must_use]
    pub fn created_at_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.created_at.as_deref())
    }

    #[must_use]
    pub fn removed_at_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.removed_at.as_deref())
    }
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
