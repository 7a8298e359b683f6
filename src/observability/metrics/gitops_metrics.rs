//! # GitOps Metrics
//!
//! Counters and histograms for the network policy GitOps workflow.
//!
//! The sink is built once at process start against a registry and shared as
//! an `Arc` by everything that records metrics. Label values never carry
//! credential material: they are fixed vocabularies (variant, operation,
//! outcome, provider name).

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Metrics sink for the GitOps workflow
#[derive(Debug, Clone)]
pub struct GitOpsMetrics {
    reconciliations: IntCounter,
    reconciliation_errors: IntCounter,
    pull_requests_created: IntCounterVec,
    pull_requests_merged: IntCounter,
    git_operations: IntCounterVec,
    provider_errors: IntCounterVec,
    rate_limited: IntCounterVec,
    drift_detected: IntCounter,
    stale_pull_requests: IntCounter,
    namespaces_processed: IntCounterVec,
    status_conflicts: IntCounter,
    namespace_duration: Histogram,
}

impl GitOpsMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            reconciliations: IntCounter::new(
                "netpol_gitops_reconciliations_total",
                "Total number of reconciliation cycles",
            )?,
            reconciliation_errors: IntCounter::new(
                "netpol_gitops_reconciliation_errors_total",
                "Total number of failed reconciliation cycles",
            )?,
            pull_requests_created: IntCounterVec::new(
                Opts::new(
                    "netpol_gitops_pull_requests_created_total",
                    "Pull requests created, by change variant",
                ),
                &["variant"],
            )?,
            pull_requests_merged: IntCounter::new(
                "netpol_gitops_pull_requests_merged_total",
                "Pull requests merged by the controller",
            )?,
            git_operations: IntCounterVec::new(
                Opts::new(
                    "netpol_gitops_git_operations_total",
                    "Git working copy operations, by operation and outcome",
                ),
                &["operation", "outcome"],
            )?,
            provider_errors: IntCounterVec::new(
                Opts::new(
                    "netpol_gitops_provider_errors_total",
                    "Git provider API errors, by provider",
                ),
                &["provider"],
            )?,
            rate_limited: IntCounterVec::new(
                Opts::new(
                    "netpol_gitops_provider_rate_limited_total",
                    "Git provider API calls rejected by rate limiting, by provider",
                ),
                &["provider"],
            )?,
            drift_detected: IntCounter::new(
                "netpol_gitops_drift_detected_total",
                "Namespaces whose cluster policies no longer match the repository",
            )?,
            stale_pull_requests: IntCounter::new(
                "netpol_gitops_stale_pull_requests_total",
                "Pull requests flagged stale",
            )?,
            namespaces_processed: IntCounterVec::new(
                Opts::new(
                    "netpol_gitops_namespaces_processed_total",
                    "Namespaces processed, by outcome",
                ),
                &["outcome"],
            )?,
            status_conflicts: IntCounter::new(
                "netpol_gitops_status_update_conflicts_total",
                "Status updates retried after a version conflict",
            )?,
            namespace_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "netpol_gitops_namespace_duration_seconds",
                    "Duration of per-namespace processing in seconds",
                )
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            )?,
        };

        registry.register(Box::new(metrics.reconciliations.clone()))?;
        registry.register(Box::new(metrics.reconciliation_errors.clone()))?;
        registry.register(Box::new(metrics.pull_requests_created.clone()))?;
        registry.register(Box::new(metrics.pull_requests_merged.clone()))?;
        registry.register(Box::new(metrics.git_operations.clone()))?;
        registry.register(Box::new(metrics.provider_errors.clone()))?;
        registry.register(Box::new(metrics.rate_limited.clone()))?;
        registry.register(Box::new(metrics.drift_detected.clone()))?;
        registry.register(Box::new(metrics.stale_pull_requests.clone()))?;
        registry.register(Box::new(metrics.namespaces_processed.clone()))?;
        registry.register(Box::new(metrics.status_conflicts.clone()))?;
        registry.register(Box::new(metrics.namespace_duration.clone()))?;

        Ok(metrics)
    }

    pub fn increment_reconciliations(&self) {
        self.reconciliations.inc();
    }

    pub fn increment_reconciliation_errors(&self) {
        self.reconciliation_errors.inc();
    }

    pub fn increment_pull_requests_created(&self, variant: &str) {
        self.pull_requests_created
            .with_label_values(&[variant])
            .inc();
    }

    pub fn increment_pull_requests_merged(&self) {
        self.pull_requests_merged.inc();
    }

    pub fn record_git_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.git_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn increment_provider_errors(&self, provider: &str) {
        self.provider_errors.with_label_values(&[provider]).inc();
    }

    pub fn increment_rate_limited(&self, provider: &str) {
        self.rate_limited.with_label_values(&[provider]).inc();
    }

    pub fn increment_drift_detected(&self) {
        self.drift_detected.inc();
    }

    pub fn increment_stale_pull_requests(&self) {
        self.stale_pull_requests.inc();
    }

    pub fn increment_namespaces_processed(&self, outcome: &str) {
        self.namespaces_processed
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn increment_status_conflicts(&self) {
        self.status_conflicts.inc();
    }

    pub fn observe_namespace_duration(&self, seconds: f64) {
        self.namespace_duration.observe(seconds);
    }
}
