//! # Watch Loop
//!
//! Runs the kube-runtime controller over every NetworkPolicyGitOps resource.
//! Each reconciliation runs one cycle and requeues after the resource's
//! reconciliation interval, which also drives the periodic sweep.

use crate::controller::reconciler::{reconcile_cycle, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::NetworkPolicyGitOps;
use crate::runtime::error_policy::{handle_reconciliation_error, log_watch_error};
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::{Action, Controller};
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconcile one resource and schedule the next cycle
pub async fn reconcile(
    config: Arc<NetworkPolicyGitOps>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let report = reconcile_cycle(&ctx, &config).await?;
    Ok(Action::requeue(report.requeue_after))
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    configs: Api<NetworkPolicyGitOps>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    Controller::new(configs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => debug!("Reconciled {}: {:?}", object, action),
                Err(e) => log_watch_error(&e.to_string()),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}
