//! # Error Policy
//!
//! Requeue policy for failed reconciliations and classification of watch
//! stream errors.

use crate::constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::NetworkPolicyGitOps;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Rate-limited cycles wait this many error intervals before retrying
const RATE_LIMIT_REQUEUE_FACTOR: u64 = 5;

/// Delay before retrying a failed reconciliation
#[must_use]
pub fn error_requeue_delay(error: &ReconcilerError) -> Duration {
    let base = DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS;
    if error.is_rate_limited() {
        Duration::from_secs(base * RATE_LIMIT_REQUEUE_FACTOR)
    } else {
        Duration::from_secs(base)
    }
}

/// Handle reconciliation errors by requeueing the resource
pub fn handle_reconciliation_error(
    obj: Arc<NetworkPolicyGitOps>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    ctx.metrics.increment_reconciliation_errors();
    let delay = error_requeue_delay(error);
    error!(
        resource.name = name,
        resource.namespace = namespace,
        "Reconciliation failed, retrying in {}s: {}",
        delay.as_secs(),
        error
    );
    Action::requeue(delay)
}

/// Kind of a watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify a watch stream error by its message
#[must_use]
pub fn classify_watch_error(message: &str) -> WatchErrorKind {
    if message.contains("401") || message.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if message.contains("410")
        || message.contains("too old resource version")
        || message.contains("Expired")
    {
        WatchErrorKind::Expired
    } else if message.contains("429") || message.contains("TooManyRequests") {
        WatchErrorKind::Throttled
    } else if message.contains("ObjectNotFound")
        || (message.contains("404") && message.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a controller stream error at a level matching its kind
///
/// The watcher restarts itself with backoff; nothing here retries.
pub fn log_watch_error(message: &str) {
    match classify_watch_error(message) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401) - check the controller's RBAC: {}", message);
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
        }
        WatchErrorKind::Throttled => {
            warn!("API server throttling the watch (429), backing off: {}", message);
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch");
        }
        WatchErrorKind::Other => error!("Controller stream error: {}", message),
    }
}
