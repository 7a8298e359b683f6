//! # Reconciliation Cycle
//!
//! One pass over a NetworkPolicyGitOps resource: process pending namespaces in
//! batches, open removal pull requests, apply retention, run the periodic sweep
//! when due and record the outcome in status.

use crate::controller::reconciler::batch::{pending_namespaces, reconcile_batches, BatchReport};
use crate::controller::reconciler::removal::{remove_namespaces, removal_candidates, RemovalReport};
use crate::controller::reconciler::retention::{apply_retention, RetentionReport};
use crate::controller::reconciler::status::{ready_condition, update_status_with};
use crate::controller::reconciler::sweep::{periodic_sweep, sweep_due, SweepReport};
use crate::controller::reconciler::types::{
    CycleSettings, DesiredNamespaces, Reconciler, ReconcilerError,
};
use crate::crd::NetworkPolicyGitOps;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Default)]
pub struct CycleReport {
    pub processed: BatchReport,
    pub removal: RemovalReport,
    pub retention: RetentionReport,
    pub sweep: Option<SweepReport>,
    /// `spec.namespaces` entries skipped as invalid namespace names
    pub invalid_namespaces: Vec<String>,
    /// Delay before the next cycle
    pub requeue_after: Duration,
}

impl CycleReport {
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.processed.failures.len()
            + self.removal.failed.len()
            + self.invalid_namespaces.len()
            + self.sweep.as_ref().map_or(0, |s| s.reprocessed.failures.len())
    }
}

/// Reconcile one NetworkPolicyGitOps resource
///
/// Invalid configuration sets `Ready=False` and returns the error. Failures of
/// individual namespaces never abort the cycle; they are logged, recorded on
/// the entry where one exists and retried next cycle.
pub async fn reconcile_cycle(
    reconciler: &Reconciler,
    config: &NetworkPolicyGitOps,
) -> Result<CycleReport, ReconcilerError> {
    let namespace = config.metadata.namespace.clone().unwrap_or_default();
    let name = config.metadata.name.clone().unwrap_or_default();
    let span = info_span!("reconcile", resource = %format!("{namespace}/{name}"));
    reconcile_cycle_inner(reconciler, config, &namespace, &name)
        .instrument(span)
        .await
}

async fn reconcile_cycle_inner(
    reconciler: &Reconciler,
    config: &NetworkPolicyGitOps,
    namespace: &str,
    name: &str,
) -> Result<CycleReport, ReconcilerError> {
    reconciler.metrics.increment_reconciliations();

    let settings = match CycleSettings::from_resource(config) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Invalid configuration: {}", e);
            let message = e.to_string();
            update_status_with(reconciler, namespace, name, |status| {
                status.set_condition(ready_condition(
                    false,
                    "InvalidConfiguration",
                    Some(message.clone()),
                ));
                status.observed_generation = config.metadata.generation;
            })
            .await?;
            return Err(e);
        }
    };

    let DesiredNamespaces { valid: desired, invalid } = settings.desired_namespaces(config);
    let desired_set: HashSet<String> = desired.iter().cloned().collect();
    let mut report = CycleReport {
        requeue_after: settings.reconciliation_interval,
        invalid_namespaces: invalid,
        ..CycleReport::default()
    };

    let pending = pending_namespaces(&desired, config.status.as_ref());
    if !pending.is_empty() {
        info!("{} namespaces pending", pending.len());
        report.processed = reconcile_batches(reconciler, &settings, &pending).await;
    }

    // Removal and retention work on the latest status, which batch processing just changed
    let latest = reconciler.cluster.get_config(namespace, name).await?;
    let latest_status = latest.status.clone().unwrap_or_default();

    let candidates = removal_candidates(&latest_status, &desired_set);
    if !candidates.is_empty() {
        info!("Removing namespaces no longer desired: {:?}", candidates);
        report.removal = remove_namespaces(reconciler, &settings, &candidates).await;
    }

    let now = Utc::now();
    let failed = report.removal.failed.clone();
    let mut retention = RetentionReport::default();
    let updated = update_status_with(reconciler, namespace, name, |status| {
        retention = apply_retention(status, &desired_set, &failed, settings.retention, now);
    })
    .await?;
    report.retention = retention;

    let status = updated.status.unwrap_or_default();
    if sweep_due(Some(&status), settings.reconciliation_interval, Utc::now()) {
        match periodic_sweep(reconciler, &settings, &status, &desired).await {
            Ok(sweep) => report.sweep = Some(sweep),
            Err(e) => warn!("Periodic sweep failed: {}", e),
        }
    }

    let failures = report.failure_count();
    let condition = if failures == 0 {
        ready_condition(true, "Reconciled", None)
    } else {
        let mut message = format!("{failures} namespace operations failed; retrying next cycle");
        if !report.invalid_namespaces.is_empty() {
            message.push_str(&format!(
                "; invalid namespace names: {}",
                report.invalid_namespaces.join(", ")
            ));
        }
        ready_condition(false, "NamespaceErrors", Some(message))
    };
    let now = Utc::now().to_rfc3339();
    update_status_with(reconciler, namespace, name, |status| {
        status.last_reconcile_time = Some(now.clone());
        status.observed_generation = config.metadata.generation;
        status.set_condition(condition.clone());
    })
    .await?;

    info!(
        "Cycle finished: {} processed, {} failed, {} removals, {} pruned",
        report.processed.outcomes.len(),
        failures,
        report.removal.outcomes.len(),
        report.retention.pruned.len()
    );
    Ok(report)
}
