//! # Status Management
//!
//! Conflict-checked writes to the NetworkPolicyGitOps status.
//!
//! Event-driven reconciliation, the periodic sweep and the removal workflow all
//! write the same status list. Every write re-reads the resource, applies the
//! mutation to that fresh copy and submits it conditionally on its resource
//! version, retrying a bounded number of times on conflict.

use crate::constants::{STATUS_UPDATE_BACKOFF_MS, STATUS_UPDATE_MAX_ATTEMPTS};
use crate::controller::cluster::ClusterError;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Condition, NetworkPolicyGitOps, NetworkPolicyGitOpsStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// Apply `mutate` to the latest status of `namespace/name` and write it back
///
/// Returns the updated resource. After [`STATUS_UPDATE_MAX_ATTEMPTS`]
/// conflicts the update is abandoned with [`ReconcilerError::StatusConflict`].
pub async fn update_status_with<F>(
    reconciler: &Reconciler,
    namespace: &str,
    name: &str,
    mut mutate: F,
) -> Result<NetworkPolicyGitOps, ReconcilerError>
where
    F: FnMut(&mut NetworkPolicyGitOpsStatus) + Send,
{
    for attempt in 1..=STATUS_UPDATE_MAX_ATTEMPTS {
        let mut latest = reconciler.cluster.get_config(namespace, name).await?;
        let mut status = latest.status.take().unwrap_or_default();
        mutate(&mut status);
        latest.status = Some(status);

        match reconciler.cluster.update_config_status(&latest).await {
            Ok(updated) => {
                debug!("Status of {}/{} updated (attempt {})", namespace, name, attempt);
                return Ok(updated);
            }
            Err(ClusterError::Conflict(message)) => {
                reconciler.metrics.increment_status_conflicts();
                warn!(
                    "Status update of {}/{} conflicted (attempt {}/{}): {}",
                    namespace, name, attempt, STATUS_UPDATE_MAX_ATTEMPTS, message
                );
                if attempt < STATUS_UPDATE_MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(
                        STATUS_UPDATE_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ReconcilerError::StatusConflict {
        resource: format!("{namespace}/{name}"),
        attempts: STATUS_UPDATE_MAX_ATTEMPTS,
    })
}

/// Ready condition reflecting the outcome of a cycle
#[must_use]
pub fn ready_condition(ready: bool, reason: &str, message: Option<String>) -> Condition {
    Condition {
        r#type: "Ready".to_string(),
        status: if ready { "True" } else { "False" }.to_string(),
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message,
    }
}
