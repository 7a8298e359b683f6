//! # Periodic Sweep
//!
//! Runs every reconciliation interval:
//! 1. refreshes tracked pull requests (merged, removal merged) and flags stale ones
//! 2. checks merged namespaces for drift between cluster and repository
//! 3. re-runs namespace reconciliation for merged namespaces to pick up new templates
//!
//! The sweep only observes; drift and stale pull requests are reported in
//! status and metrics, never remediated.

use crate::constants::{DRIFT_BATCH_DELAY_SECS, DRIFT_BATCH_SIZE};
use crate::controller::gitops::credentials::resolve_credentials;
use crate::controller::gitops::{layout, SanitizedError, WorkingCopy};
use crate::controller::reconciler::batch::{reconcile_batches, run_in_batches, BatchReport};
use crate::controller::reconciler::drift::policy_rules_hash;
use crate::controller::reconciler::namespace::provider_client;
use crate::controller::reconciler::status::update_status_with;
use crate::controller::reconciler::types::{CycleSettings, Reconciler, ReconcilerError};
use crate::crd::{NamespacePhase, NetworkPolicyGitOpsStatus};
use crate::provider::{GitProviderApi, PullRequestState};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Provider-side state of a tracked pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestRefresh {
    Merged,
    Declined,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub merged: Vec<String>,
    pub removals_completed: Vec<String>,
    pub stale: Vec<String>,
    /// Namespace -> drift detected
    pub drift: BTreeMap<String, bool>,
    pub reprocessed: BatchReport,
}

/// Whether the sweep is due at `now`
#[must_use]
pub fn sweep_due(
    status: Option<&NetworkPolicyGitOpsStatus>,
    interval: std::time::Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = status
        .and_then(|s| s.last_periodic_sweep_time.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    else {
        return true;
    };
    let interval = Duration::from_std(interval).unwrap_or_else(|_| Duration::hours(1));
    now.signed_duration_since(last.with_timezone(&Utc)) >= interval
}

/// Apply pull request refreshes and stale flagging to `status`
///
/// Returns (merged, removals completed, newly stale).
pub fn apply_pull_request_refresh(
    status: &mut NetworkPolicyGitOpsStatus,
    refreshed: &HashMap<String, PullRequestRefresh>,
    stale_threshold: Duration,
    now: DateTime<Utc>,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut merged = Vec::new();
    let mut removed = Vec::new();
    let mut stale = Vec::new();
    let now_str = now.to_rfc3339();

    for entry in &mut status.network_policies {
        match (entry.state, refreshed.get(&entry.namespace)) {
            (NamespacePhase::PrRemoval, Some(PullRequestRefresh::Merged)) => {
                entry.state = NamespacePhase::Removed;
                entry.removed_at = Some(now_str.clone());
                entry.last_error = None;
                removed.push(entry.namespace.clone());
            }
            (state, Some(PullRequestRefresh::Merged)) if state.is_open() => {
                entry.state = NamespacePhase::PrMerged;
                entry.last_error = None;
                merged.push(entry.namespace.clone());
            }
            (state, Some(PullRequestRefresh::Declined))
                if state.is_open() || state == NamespacePhase::PrRemoval =>
            {
                entry.last_error = Some("pull request was declined".to_string());
            }
            (NamespacePhase::PrCreated | NamespacePhase::PrPending, _) => {
                let age = entry
                    .created_at_time()
                    .map(|created| now.signed_duration_since(created));
                if age.is_some_and(|age| age > stale_threshold) {
                    entry.state = NamespacePhase::PrStale;
                    stale.push(entry.namespace.clone());
                }
            }
            _ => {}
        }
    }
    (merged, removed, stale)
}

/// Run the periodic sweep for one resource
pub async fn periodic_sweep(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    status: &NetworkPolicyGitOpsStatus,
    desired: &[String],
) -> Result<SweepReport, ReconcilerError> {
    let span = info_span!("periodic_sweep", resource = %settings.resource_name);
    periodic_sweep_inner(reconciler, settings, status, desired)
        .instrument(span)
        .await
}

async fn periodic_sweep_inner(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    status: &NetworkPolicyGitOpsStatus,
    desired: &[String],
) -> Result<SweepReport, ReconcilerError> {
    let mut report = SweepReport::default();
    let repo = &settings.repository;
    let credentials =
        resolve_credentials(reconciler.cluster.as_ref(), &repo.credentials_secret_ref).await?;

    let refreshed = refresh_pull_requests(reconciler, settings, &credentials, status).await?;

    let merged_namespaces: Vec<String> = status
        .network_policies
        .iter()
        .filter(|e| {
            e.state == NamespacePhase::PrMerged
                || (e.state.is_open()
                    && refreshed.get(&e.namespace) == Some(&PullRequestRefresh::Merged))
        })
        .filter(|e| desired.contains(&e.namespace))
        .map(|e| e.namespace.clone())
        .collect();

    if !merged_namespaces.is_empty() {
        let wc = WorkingCopy::clone(repo, &credentials, Arc::clone(&reconciler.metrics)).await?;
        wc.sync_base().await;
        let checks = run_in_batches(
            DRIFT_BATCH_SIZE,
            std::time::Duration::ZERO,
            std::time::Duration::from_secs(DRIFT_BATCH_DELAY_SECS),
            &merged_namespaces,
            |namespace| {
                let wc = &wc;
                async move {
                    let result = detect_drift(reconciler, settings, wc, &namespace).await;
                    (namespace, result)
                }
            },
        )
        .await;
        for (namespace, result) in checks {
            match result {
                Ok(drifted) => {
                    report.drift.insert(namespace, drifted);
                }
                Err(e) => warn!(
                    "Drift check of {} failed: {}",
                    namespace,
                    SanitizedError::new(None, &e.to_string())
                ),
            }
        }
    }

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let mut outcome = (Vec::new(), Vec::new(), Vec::new());
    update_status_with(
        reconciler,
        &settings.resource_namespace,
        &settings.resource_name,
        |status| {
            outcome =
                apply_pull_request_refresh(status, &refreshed, settings.stale_threshold, now);
            for (namespace, drifted) in &report.drift {
                if let Some(entry) = status.entry_mut(namespace) {
                    entry.drift_detected = Some(*drifted);
                    entry.last_drift_check = Some(now_str.clone());
                }
            }
            status.last_periodic_sweep_time = Some(now_str.clone());
        },
    )
    .await?;
    (report.merged, report.removals_completed, report.stale) = outcome;

    for _ in &report.merged {
        reconciler.metrics.increment_pull_requests_merged();
    }
    for namespace in &report.stale {
        reconciler.metrics.increment_stale_pull_requests();
        warn!("Pull request for {} is stale", namespace);
    }

    // New templates for namespaces whose previous pull request is merged
    report.reprocessed = reconcile_batches(reconciler, settings, &merged_namespaces).await;

    info!(
        "Sweep finished: {} merged, {} removals completed, {} stale, {} drifted",
        report.merged.len(),
        report.removals_completed.len(),
        report.stale.len(),
        report.drift.values().filter(|d| **d).count()
    );
    Ok(report)
}

/// Look up the provider state of every tracked open or removal pull request
async fn refresh_pull_requests(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    credentials: &crate::controller::gitops::Credentials,
    status: &NetworkPolicyGitOpsStatus,
) -> Result<HashMap<String, PullRequestRefresh>, ReconcilerError> {
    let tracked: Vec<(String, u64)> = status
        .network_policies
        .iter()
        .filter(|e| e.state.is_open() || e.state == NamespacePhase::PrRemoval)
        .filter_map(|e| e.pr_number.map(|n| (e.namespace.clone(), n)))
        .collect();
    let mut refreshed = HashMap::new();
    if tracked.is_empty() {
        return Ok(refreshed);
    }

    let provider = provider_client(reconciler, settings, credentials)?;
    for (namespace, number) in tracked {
        match provider.get_pull_request(number).await {
            Ok(Some(pr)) => match pr.state {
                PullRequestState::Merged => {
                    refreshed.insert(namespace, PullRequestRefresh::Merged);
                }
                PullRequestState::Declined => {
                    refreshed.insert(namespace, PullRequestRefresh::Declined);
                }
                _ => debug!("Pull request #{} for {} is {}", number, namespace, pr.state),
            },
            Ok(None) => warn!("Pull request #{} for {} no longer exists", number, namespace),
            Err(e) => warn!("Could not refresh pull request #{} for {}: {}", number, namespace, e),
        }
    }
    Ok(refreshed)
}

/// Compare every policy file of `namespace` in the repository with the cluster
///
/// Drift means a repository policy is missing from the cluster or enforces
/// different rules. Cluster policies without a file are not drift.
pub async fn detect_drift(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    wc: &WorkingCopy,
    namespace: &str,
) -> Result<bool, ReconcilerError> {
    let files = wc.list_yaml_files(&layout::namespace_dir(settings.cluster_name(), namespace))?;
    let live = reconciler.cluster.list_network_policies(namespace).await?;
    let live_by_name: HashMap<&str, &NetworkPolicy> = live
        .iter()
        .filter_map(|p| p.metadata.name.as_deref().map(|n| (n, p)))
        .collect();

    let mut drifted = false;
    for path in files {
        let content = wc.read_file(&path).await?;
        let desired: NetworkPolicy = match serde_yaml::from_str(&content) {
            Ok(policy) => policy,
            Err(e) => {
                warn!("Skipping unparseable policy file {}: {}", path, e);
                continue;
            }
        };
        let name = desired
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| layout::template_base(&path));
        match live_by_name.get(name.as_str()) {
            None => {
                warn!("Drift in {}: {} is in the repository but not in the cluster", namespace, name);
                drifted = true;
            }
            Some(current) if policy_rules_hash(current) != policy_rules_hash(&desired) => {
                warn!("Drift in {}: {} differs from the repository", namespace, name);
                drifted = true;
            }
            Some(_) => debug!("{} matches the repository", name),
        }
    }

    if drifted {
        reconciler.metrics.increment_drift_detected();
    }
    Ok(drifted)
}
