//! # Status Retention
//!
//! Keeps removed namespaces in status for a configurable horizon, then prunes them.

use crate::crd::{NamespacePhase, NetworkPolicyGitOpsStatus};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub pruned: Vec<String>,
    pub marked_removed: Vec<String>,
}

/// Apply retention to `status` at time `now`
///
/// - entries of desired namespaces are left alone
/// - `removed` entries older than `retention` are deleted (an entry exactly at
///   the horizon is kept); a `removed` entry without a timestamp starts its clock now
/// - entries of namespaces that left the desired set without being marked are
///   marked `removed`, keeping their pull request fields, unless their removal
///   failed this cycle or a removal pull request is in flight
pub fn apply_retention(
    status: &mut NetworkPolicyGitOpsStatus,
    desired: &HashSet<String>,
    failed_removals: &HashSet<String>,
    retention: Duration,
    now: DateTime<Utc>,
) -> RetentionReport {
    let mut report = RetentionReport::default();
    let now_str = now.to_rfc3339();

    for entry in &mut status.network_policies {
        if desired.contains(&entry.namespace) {
            continue;
        }
        match entry.state {
            NamespacePhase::Removed => {
                if entry.removed_at_time().is_none() {
                    entry.removed_at = Some(now_str.clone());
                }
            }
            NamespacePhase::PrRemoval => {}
            _ if failed_removals.contains(&entry.namespace) => {}
            _ => {
                entry.state = NamespacePhase::Removed;
                entry.removed_at = Some(now_str.clone());
                report.marked_removed.push(entry.namespace.clone());
            }
        }
    }

    status.network_policies.retain(|entry| {
        let expired = !desired.contains(&entry.namespace)
            && entry.state == NamespacePhase::Removed
            && entry
                .removed_at_time()
                .is_some_and(|removed| now.signed_duration_since(removed) > retention);
        if expired {
            report.pruned.push(entry.namespace.clone());
        }
        !expired
    });

    if !report.pruned.is_empty() {
        info!("Pruned expired status entries: {:?}", report.pruned);
    }
    report
}
