//! # Reconciler Types
//!
//! Shared context, per-cycle settings and the reconciler error type.

use crate::config::ControllerConfig;
use crate::controller::cluster::{ClusterAccess, ClusterError};
use crate::controller::gitops::kustomization::KustomizationError;
use crate::controller::gitops::{CredentialsError, WorkingCopyError};
use crate::controller::reconciler::template::TemplateError;
use crate::controller::reconciler::validation::{
    is_valid_namespace_name, parse_kubernetes_duration, parse_kubernetes_duration_allow_zero,
    validate_network_policy_gitops, NamespaceMatcher,
};
use crate::crd::{GitRepositoryConfig, NetworkPolicyGitOps};
use crate::observability::metrics::GitOpsMetrics;
use crate::provider::ProviderError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Long-lived reconciler context shared by every reconciliation
pub struct Reconciler {
    pub cluster: Arc<dyn ClusterAccess>,
    pub metrics: Arc<GitOpsMetrics>,
    pub http: reqwest::Client,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterAccess>,
        metrics: Arc<GitOpsMetrics>,
        config: ControllerConfig,
    ) -> Result<Self, ReconcilerError> {
        let http = crate::provider::build_http_client(config.http_timeout, true)?;
        Ok(Self {
            cluster,
            metrics,
            http,
            config,
        })
    }
}

/// Errors surfaced by reconciliation steps
///
/// Every variant that can carry provider or git output holds sanitized text.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    WorkingCopy(#[from] WorkingCopyError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Kustomization(#[from] KustomizationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("status update of {resource} gave up after {attempts} conflicting attempts")]
    StatusConflict { resource: String, attempts: u32 },
}

impl ReconcilerError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ReconcilerError::Provider(e) if e.is_rate_limited())
    }
}

/// Settings of one NetworkPolicyGitOps resource, parsed once per cycle
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Namespace of the NetworkPolicyGitOps resource
    pub resource_namespace: String,
    /// Name of the NetworkPolicyGitOps resource
    pub resource_name: String,
    pub repository: GitRepositoryConfig,
    pub template_dir: String,
    pub exclude: NamespaceMatcher,
    pub backup_existing: bool,
    pub backup_exclude: NamespaceMatcher,
    pub batch_size: usize,
    pub sleep_between_namespaces: Duration,
    pub sleep_between_batches: Duration,
    pub auto_merge: bool,
    pub merge_label: String,
    pub wait_before_merge: Duration,
    pub retention: chrono::Duration,
    pub reconciliation_interval: Duration,
    pub stale_threshold: chrono::Duration,
}

impl CycleSettings {
    /// Validate and parse the spec of `config`
    pub fn from_resource(config: &NetworkPolicyGitOps) -> Result<Self, ReconcilerError> {
        let spec = &config.spec;
        let invalid = |e: anyhow::Error| ReconcilerError::InvalidConfig(format!("{e:#}"));
        validate_network_policy_gitops(spec).map_err(invalid)?;

        let stale = parse_kubernetes_duration(&spec.stale_pr_threshold).map_err(invalid)?;
        Ok(Self {
            resource_namespace: config
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            resource_name: config.metadata.name.clone().unwrap_or_default(),
            repository: spec.git_repository.clone(),
            template_dir: spec.template_dir.trim_matches('/').to_string(),
            exclude: NamespaceMatcher::new(&spec.exclude_namespaces).map_err(invalid)?,
            backup_existing: spec.backup_existing,
            backup_exclude: NamespaceMatcher::new(&spec.backup_exclude_namespaces)
                .map_err(invalid)?,
            batch_size: usize::try_from(spec.batch_processing.batch_size)
                .unwrap_or(usize::MAX)
                .max(1),
            sleep_between_namespaces: parse_kubernetes_duration_allow_zero(
                &spec.batch_processing.sleep_between_namespaces,
            )
            .map_err(invalid)?,
            sleep_between_batches: parse_kubernetes_duration_allow_zero(
                &spec.batch_processing.sleep_between_batches,
            )
            .map_err(invalid)?,
            auto_merge: spec.auto_merge.enabled,
            merge_label: spec.auto_merge.label.clone(),
            wait_before_merge: parse_kubernetes_duration_allow_zero(
                &spec.auto_merge.wait_before_merge,
            )
            .map_err(invalid)?,
            retention: chrono::Duration::days(i64::from(spec.status_retention_days)),
            reconciliation_interval: parse_kubernetes_duration(&spec.reconciliation_interval)
                .map_err(invalid)?,
            stale_threshold: chrono::Duration::from_std(stale)
                .map_err(|e| ReconcilerError::InvalidConfig(format!("stalePrThreshold: {e}")))?,
        })
    }

    /// Namespace may be touched by any network policy operation
    #[must_use]
    pub fn is_managed(&self, namespace: &str) -> bool {
        !self.exclude.matches(namespace)
    }

    /// Existing policies of `namespace` may be captured into the repository
    #[must_use]
    pub fn backup_allowed(&self, namespace: &str) -> bool {
        self.backup_existing && !self.backup_exclude.matches(namespace)
    }

    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.repository.cluster_name
    }

    /// Desired namespaces in spec order, exclusions and duplicates removed
    ///
    /// Entries that are not valid namespace names are returned separately and
    /// never reach the repository layout.
    #[must_use]
    pub fn desired_namespaces(&self, config: &NetworkPolicyGitOps) -> DesiredNamespaces {
        let mut seen = std::collections::HashSet::new();
        let mut desired = DesiredNamespaces::default();
        for namespace in &config.spec.namespaces {
            if !is_valid_namespace_name(namespace) {
                warn!("Ignoring namespaces entry '{}': not a valid namespace name", namespace);
                desired.invalid.push(namespace.clone());
                continue;
            }
            if self.is_managed(namespace) && seen.insert(namespace.as_str()) {
                desired.valid.push(namespace.clone());
            }
        }
        desired
    }
}

/// Desired namespace set of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredNamespaces {
    /// Managed namespaces in spec order
    pub valid: Vec<String>,
    /// Entries rejected as namespace names
    pub invalid: Vec<String>,
}
