//! # Namespace Removal
//!
//! Opens a deletion pull request for every namespace that has a status entry
//! but left the desired set.

use crate::controller::gitops::credentials::resolve_credentials;
use crate::controller::gitops::{kustomization, layout, SanitizedError, WorkingCopy};
use crate::controller::reconciler::namespace::provider_client;
use crate::controller::reconciler::status::update_status_with;
use crate::controller::reconciler::types::{CycleSettings, Reconciler, ReconcilerError};
use crate::crd::{NamespacePhase, NamespaceStatusEntry, NetworkPolicyGitOpsStatus};
use crate::provider::{CreatePullRequest, GitProviderApi};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// Result of removing one namespace
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    /// Deletion pull request opened; entry moved to `pr-removal`
    PullRequestCreated(NamespaceStatusEntry),
    /// Nothing in the repository; entry moved straight to `removed`
    NothingToRemove,
}

#[derive(Debug, Default)]
pub struct RemovalReport {
    pub outcomes: Vec<(String, RemovalOutcome)>,
    pub failed: HashSet<String>,
}

/// Entries whose namespace left the desired set and has no removal in flight
#[must_use]
pub fn removal_candidates(
    status: &NetworkPolicyGitOpsStatus,
    desired: &HashSet<String>,
) -> Vec<String> {
    status
        .network_policies
        .iter()
        .filter(|e| !desired.contains(&e.namespace))
        .filter(|e| !matches!(e.state, NamespacePhase::Removed | NamespacePhase::PrRemoval))
        .map(|e| e.namespace.clone())
        .collect()
}

/// Remove every candidate namespace; failures are recorded on the entry and reported
pub async fn remove_namespaces(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    candidates: &[String],
) -> RemovalReport {
    let mut report = RemovalReport::default();
    for namespace in candidates {
        match remove_namespace(reconciler, settings, namespace).await {
            Ok(outcome) => report.outcomes.push((namespace.clone(), outcome)),
            Err(e) => {
                let message = SanitizedError::new(None, &e.to_string()).to_string();
                error!("Failed to remove namespace {}: {}", namespace, message);
                let recorded = update_status_with(
                    reconciler,
                    &settings.resource_namespace,
                    &settings.resource_name,
                    |status| {
                        if let Some(entry) = status.entry_mut(namespace) {
                            entry.last_error = Some(message.clone());
                        }
                    },
                )
                .await;
                if let Err(e) = recorded {
                    error!("Could not record removal failure for {}: {}", namespace, e);
                }
                report.failed.insert(namespace.clone());
            }
        }
    }
    report
}

/// Open a pull request deleting `namespace`'s files and index entries
pub async fn remove_namespace(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespace: &str,
) -> Result<RemovalOutcome, ReconcilerError> {
    let span = info_span!("namespace.remove", namespace = %namespace);
    remove_namespace_inner(reconciler, settings, namespace)
        .instrument(span)
        .await
}

async fn remove_namespace_inner(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespace: &str,
) -> Result<RemovalOutcome, ReconcilerError> {
    let repo = &settings.repository;
    let cluster = settings.cluster_name();
    let credentials =
        resolve_credentials(reconciler.cluster.as_ref(), &repo.credentials_secret_ref).await?;
    let wc = WorkingCopy::clone(repo, &credentials, Arc::clone(&reconciler.metrics)).await?;
    wc.sync_base().await;

    let files = wc.list_yaml_files(&layout::namespace_dir(cluster, namespace))?;
    if files.is_empty() {
        info!("No files for {} in the repository; marking removed", namespace);
        mark_removed(reconciler, settings, namespace).await?;
        return Ok(RemovalOutcome::NothingToRemove);
    }

    let provider = provider_client(reconciler, settings, &credentials)?;
    let branch = layout::removal_branch(cluster, namespace);

    let pr = match provider.find_pull_request_by_branch(&branch).await? {
        Some(open) if open.is_open() => {
            info!("Removal pull request #{} already open for {}", open.number, namespace);
            open
        }
        _ => {
            provider.delete_branch(&branch).await?;
            wc.checkout_branch(&branch, true).await?;
            for file in &files {
                wc.remove_file(file).await?;
            }
            kustomization::remove_namespace(&wc, cluster, namespace).await?;

            let message = format!("Remove network policies for {cluster}/{namespace}");
            if !wc.commit_and_push(&branch, &message).await? {
                mark_removed(reconciler, settings, namespace).await?;
                return Ok(RemovalOutcome::NothingToRemove);
            }

            let mut description = format!(
                "Namespace `{namespace}` was removed from the desired set of cluster `{cluster}`.\n\nDeleted files:\n"
            );
            for file in &files {
                description.push_str(&format!("- `{file}`\n"));
            }
            let pr = provider
                .create_pull_request(&CreatePullRequest {
                    title: format!("[netpol-gitops] {cluster}/{namespace}: remove network policies"),
                    description,
                    source_branch: branch.clone(),
                    target_branch: repo.base_branch.clone(),
                    labels: Vec::new(),
                })
                .await?;
            reconciler.metrics.increment_pull_requests_created("removal");
            info!("Opened removal pull request #{} for {}", pr.number, namespace);
            pr
        }
    };

    let mut entry = NamespaceStatusEntry::new(namespace, NamespacePhase::PrRemoval);
    entry.pr_number = Some(pr.number);
    entry.pr_branch = Some(branch);
    entry.pr_url = Some(pr.url);
    entry.created_at = Some(chrono::Utc::now().to_rfc3339());
    update_status_with(
        reconciler,
        &settings.resource_namespace,
        &settings.resource_name,
        |status| status.upsert(entry.clone()),
    )
    .await?;
    Ok(RemovalOutcome::PullRequestCreated(entry))
}

async fn mark_removed(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespace: &str,
) -> Result<(), ReconcilerError> {
    let now = chrono::Utc::now().to_rfc3339();
    update_status_with(
        reconciler,
        &settings.resource_namespace,
        &settings.resource_name,
        |status| {
            if let Some(entry) = status.entry_mut(namespace) {
                entry.state = NamespacePhase::Removed;
                entry.removed_at = Some(now.clone());
                entry.last_error = None;
            }
        },
    )
    .await?;
    Ok(())
}
