//! # Batch Scheduler
//!
//! Works through namespaces in fixed-size batches with blocking pauses between
//! namespaces (provider rate limits) and between batches (lets pull-based
//! GitOps appliers catch up). One failing namespace never stops the batch.

use crate::controller::gitops::SanitizedError;
use crate::controller::reconciler::namespace::{reconcile_namespace, NamespaceOutcome};
use crate::controller::reconciler::types::{CycleSettings, Reconciler};
use crate::crd::{NamespacePhase, NetworkPolicyGitOpsStatus};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, NamespaceOutcome)>,
    /// Namespace and sanitized error message
    pub failures: Vec<(String, String)>,
}

/// Run `work` for every namespace, paced by the batch settings
///
/// Results are returned in input order.
pub async fn run_in_batches<T, F, Fut>(
    batch_size: usize,
    sleep_between_items: Duration,
    sleep_between_batches: Duration,
    namespaces: &[String],
    mut work: F,
) -> Vec<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = T>,
{
    let mut results = Vec::with_capacity(namespaces.len());
    let batches: Vec<&[String]> = namespaces.chunks(batch_size.max(1)).collect();
    let batch_count = batches.len();
    for (index, batch) in batches.into_iter().enumerate() {
        info!(
            "Processing batch {}/{} ({} namespaces)",
            index + 1,
            batch_count,
            batch.len()
        );
        for (position, namespace) in batch.iter().enumerate() {
            results.push(work(namespace.clone()).await);
            if position + 1 < batch.len() && !sleep_between_items.is_zero() {
                tokio::time::sleep(sleep_between_items).await;
            }
        }
        if index + 1 < batch_count && !sleep_between_batches.is_zero() {
            tokio::time::sleep(sleep_between_batches).await;
        }
    }
    results
}

/// Desired namespaces that still need processing
///
/// Namespaces with a status entry are skipped unless the entry is `removed`,
/// which re-admits a namespace that came back into the desired set.
#[must_use]
pub fn pending_namespaces(
    desired: &[String],
    status: Option<&NetworkPolicyGitOpsStatus>,
) -> Vec<String> {
    desired
        .iter()
        .filter(|ns| {
            status
                .and_then(|s| s.entry(ns))
                .is_none_or(|entry| entry.state == NamespacePhase::Removed)
        })
        .cloned()
        .collect()
}

/// Reconcile `namespaces` in batches
pub async fn reconcile_batches(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespaces: &[String],
) -> BatchReport {
    let results = run_in_batches(
        settings.batch_size,
        settings.sleep_between_namespaces,
        settings.sleep_between_batches,
        namespaces,
        |namespace| async move {
            let result = reconcile_namespace(reconciler, settings, &namespace).await;
            (namespace, result)
        },
    )
    .await;

    let mut report = BatchReport::default();
    for (namespace, result) in results {
        match result {
            Ok(outcome) => report.outcomes.push((namespace, outcome)),
            Err(e) => {
                let message = SanitizedError::new(None, &e.to_string());
                error!("Failed to reconcile namespace {}: {}", namespace, message);
                report.failures.push((namespace, message.to_string()));
            }
        }
    }
    report
}
