//! # Namespace Reconciliation
//!
//! Brings one namespace's policies into the GitOps repository and tracks the
//! resulting pull request.
//!
//! Each template whose file is missing from the repository yields one file:
//! - **new**: no cluster policy of the rendered name exists, so the template is rendered
//! - **template backup**: the rendered name already exists in the cluster and
//!   backups are allowed, so the live object is captured instead
//!
//! Cluster policies that no template accounts for are captured as **foreign
//! backups** when backups are allowed. A pull request containing only new files
//! may be auto-merged; any backup requires a manual merge.

use crate::constants::MERGE_POLL_ATTEMPTS;
use crate::controller::gitops::credentials::resolve_credentials;
use crate::controller::gitops::{kustomization, layout, Credentials, WorkingCopy};
use crate::controller::reconciler::status::update_status_with;
use crate::controller::reconciler::template::{self, Template};
use crate::controller::reconciler::types::{CycleSettings, Reconciler, ReconcilerError};
use crate::crd::{NamespacePhase, NamespaceStatusEntry};
use crate::provider::{CreatePullRequest, GitProviderApi, ProviderClient, PullRequest};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// How a produced file came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrigin {
    /// Rendered from a template
    Rendered,
    /// Live copy of a policy a template would have produced
    TemplateBackup,
    /// Live copy of a policy no template accounts for
    ForeignBackup,
}

/// Classification of a whole change set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeVariant {
    New,
    Backup,
}

impl ChangeVariant {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeVariant::New => "new",
            ChangeVariant::Backup => "backup",
        }
    }

    fn classify(files: &[ProducedFile]) -> Self {
        if files.iter().all(|f| f.origin == FileOrigin::Rendered) {
            ChangeVariant::New
        } else {
            ChangeVariant::Backup
        }
    }
}

impl fmt::Display for ChangeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest to be written into the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedFile {
    pub path: String,
    pub content: String,
    pub origin: FileOrigin,
}

/// Result of reconciling one namespace
#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceOutcome {
    /// Repository already holds everything; nothing was pushed
    NoChanges,
    /// An open pull request for this namespace already exists
    PullRequestOpen { number: u64 },
    /// A pull request was created and status recorded
    Created {
        entry: NamespaceStatusEntry,
        variant: ChangeVariant,
    },
}

impl NamespaceOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            NamespaceOutcome::NoChanges => "no_changes",
            NamespaceOutcome::PullRequestOpen { .. } => "pr_open",
            NamespaceOutcome::Created { .. } => "created",
        }
    }
}

/// Reconcile `namespace` against the repository
pub async fn reconcile_namespace(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespace: &str,
) -> Result<NamespaceOutcome, ReconcilerError> {
    let span = info_span!(
        "namespace.reconcile",
        namespace = %namespace,
        cluster = %settings.cluster_name()
    );
    let start = Instant::now();
    let result = reconcile_namespace_inner(reconciler, settings, namespace)
        .instrument(span)
        .await;
    reconciler
        .metrics
        .observe_namespace_duration(start.elapsed().as_secs_f64());
    reconciler.metrics.increment_namespaces_processed(match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    });
    result
}

async fn reconcile_namespace_inner(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    namespace: &str,
) -> Result<NamespaceOutcome, ReconcilerError> {
    let repo = &settings.repository;
    let credentials =
        resolve_credentials(reconciler.cluster.as_ref(), &repo.credentials_secret_ref).await?;

    let wc = WorkingCopy::clone(repo, &credentials, Arc::clone(&reconciler.metrics)).await?;
    wc.sync_base().await;

    let files = produce_files(reconciler, settings, &wc, namespace).await?;
    if files.is_empty() {
        debug!("Repository already up to date for {}", namespace);
        return Ok(NamespaceOutcome::NoChanges);
    }

    let provider = provider_client(reconciler, settings, &credentials)?;
    let branch = layout::namespace_branch(settings.cluster_name(), namespace);
    if let Some(open) = provider.find_pull_request_by_branch(&branch).await? {
        if open.is_open() {
            info!(
                "Pull request #{} for {} is still open; skipping",
                open.number, namespace
            );
            return Ok(NamespaceOutcome::PullRequestOpen {
                number: open.number,
            });
        }
    }

    // The branch is rebuilt from the base on every attempt
    provider.delete_branch(&branch).await?;
    wc.checkout_branch(&branch, true).await?;

    kustomization::ensure(&wc, settings.cluster_name()).await?;
    for file in &files {
        wc.write_file(&file.path, &file.content).await?;
        kustomization::add_file(&wc, settings.cluster_name(), &file.path).await?;
    }

    let variant = ChangeVariant::classify(&files);
    let message = format!(
        "Add network policies for {}/{} ({})",
        settings.cluster_name(),
        namespace,
        variant
    );
    if !wc.commit_and_push(&branch, &message).await? {
        return Ok(NamespaceOutcome::NoChanges);
    }

    let auto_merge = settings.auto_merge && variant == ChangeVariant::New;
    let request = CreatePullRequest {
        title: format!(
            "[netpol-gitops] {}/{}: {} network policies",
            settings.cluster_name(),
            namespace,
            match variant {
                ChangeVariant::New => "add",
                ChangeVariant::Backup => "back up",
            }
        ),
        description: pull_request_body(settings, namespace, variant, &files),
        source_branch: branch.clone(),
        target_branch: repo.base_branch.clone(),
        labels: if auto_merge {
            vec![settings.merge_label.clone()]
        } else {
            Vec::new()
        },
    };
    let pr = provider.create_pull_request(&request).await?;
    reconciler
        .metrics
        .increment_pull_requests_created(variant.as_str());
    info!(
        "Opened pull request #{} for {} ({})",
        pr.number, namespace, variant
    );

    let mut entry = NamespaceStatusEntry::new(namespace, NamespacePhase::PrPending);
    entry.pr_number = Some(pr.number);
    entry.pr_branch = Some(branch);
    entry.pr_url = Some(pr.url.clone());
    entry.created_at = Some(chrono::Utc::now().to_rfc3339());

    if auto_merge {
        entry.state = NamespacePhase::PrCreated;
        write_entry(reconciler, settings, &entry).await?;
        entry.state = if auto_merge_pull_request(reconciler, settings, &provider, &pr).await {
            NamespacePhase::PrMerged
        } else {
            NamespacePhase::PrPending
        };
    }
    write_entry(reconciler, settings, &entry).await?;

    Ok(NamespaceOutcome::Created { entry, variant })
}

/// Files missing from the repository for `namespace`
pub async fn produce_files(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    wc: &WorkingCopy,
    namespace: &str,
) -> Result<Vec<ProducedFile>, ReconcilerError> {
    let cluster_name = settings.cluster_name();
    let templates = load_templates(wc, &settings.template_dir).await?;
    let live = reconciler
        .cluster
        .list_network_policies(namespace)
        .await?;
    let backup_allowed = settings.backup_allowed(namespace);

    let mut files = Vec::new();
    let mut template_names = HashSet::new();

    for template in &templates {
        let name = template.policy_name(namespace);
        template_names.insert(name.clone());
        let path = layout::rendered_policy_path(cluster_name, namespace, &template.file_name);
        if wc.exists(&path).await? {
            continue;
        }

        match find_policy(&live, &name) {
            Some(existing) if backup_allowed => {
                files.push(ProducedFile {
                    path,
                    content: template::to_gitops_yaml(existing)?,
                    origin: FileOrigin::TemplateBackup,
                });
            }
            Some(_) => {
                debug!("{} exists in the cluster and backups are disabled", name);
            }
            None => {
                match template::render(
                    reconciler.cluster.as_ref(),
                    template,
                    namespace,
                    &settings.resource_namespace,
                )
                .await
                {
                    Ok(content) => files.push(ProducedFile {
                        path,
                        content,
                        origin: FileOrigin::Rendered,
                    }),
                    Err(e) => warn!("Skipping template {} for {}: {}", template.path, namespace, e),
                }
            }
        }
    }

    if backup_allowed {
        for policy in &live {
            let Some(name) = policy.metadata.name.as_deref() else {
                continue;
            };
            if template_names.contains(name) {
                continue;
            }
            let path = layout::backup_policy_path(cluster_name, namespace, name);
            if wc.exists(&path).await? {
                continue;
            }
            files.push(ProducedFile {
                path,
                content: template::to_gitops_yaml(policy)?,
                origin: FileOrigin::ForeignBackup,
            });
        }
    }

    Ok(files)
}

/// Parse every template in `dir`; unreadable templates are skipped
pub async fn load_templates(wc: &WorkingCopy, dir: &str) -> Result<Vec<Template>, ReconcilerError> {
    let mut templates = Vec::new();
    for path in wc.list_yaml_files(dir)? {
        let content = wc.read_file(&path).await?;
        match Template::parse(&path, &content) {
            Ok(template) => templates.push(template),
            Err(e) => warn!("Ignoring template {}: {}", path, e),
        }
    }
    Ok(templates)
}

fn find_policy<'a>(policies: &'a [NetworkPolicy], name: &str) -> Option<&'a NetworkPolicy> {
    policies
        .iter()
        .find(|p| p.metadata.name.as_deref() == Some(name))
}

pub(crate) fn provider_client(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    credentials: &Credentials,
) -> Result<ProviderClient, ReconcilerError> {
    Ok(ProviderClient::for_repository(
        &settings.repository,
        credentials,
        reconciler.http.clone(),
        reconciler.config.http_timeout,
        Arc::clone(&reconciler.metrics),
    )?)
}

async fn write_entry(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    entry: &NamespaceStatusEntry,
) -> Result<(), ReconcilerError> {
    update_status_with(
        reconciler,
        &settings.resource_namespace,
        &settings.resource_name,
        |status| status.upsert(entry.clone()),
    )
    .await?;
    Ok(())
}

/// Try to merge `pr`, then poll with doubling delays until it reports merged
///
/// Returns whether the pull request ended up merged. Merge failures are logged only.
async fn auto_merge_pull_request(
    reconciler: &Reconciler,
    settings: &CycleSettings,
    provider: &ProviderClient,
    pr: &PullRequest,
) -> bool {
    if !settings.wait_before_merge.is_zero() {
        tokio::time::sleep(settings.wait_before_merge).await;
    }
    if let Err(e) = provider.merge_pull_request(pr.number).await {
        warn!("Auto-merge of pull request #{} failed: {}", pr.number, e);
    }

    let mut delay = settings.wait_before_merge.max(Duration::from_millis(100));
    for attempt in 1..=MERGE_POLL_ATTEMPTS {
        match provider.get_pull_request(pr.number).await {
            Ok(Some(current)) if current.is_merged() => {
                reconciler.metrics.increment_pull_requests_merged();
                info!("Pull request #{} merged", pr.number);
                return true;
            }
            Ok(_) => debug!(
                "Pull request #{} not merged yet (poll {}/{})",
                pr.number, attempt, MERGE_POLL_ATTEMPTS
            ),
            Err(e) => warn!("Could not poll pull request #{}: {}", pr.number, e),
        }
        if attempt < MERGE_POLL_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    false
}

fn pull_request_body(
    settings: &CycleSettings,
    namespace: &str,
    variant: ChangeVariant,
    files: &[ProducedFile],
) -> String {
    let mut body = format!(
        "Network policies for namespace `{namespace}` on cluster `{}`.\n\nChange type: **{variant}**\n\nFiles:\n",
        settings.cluster_name()
    );
    for file in files {
        let origin = match file.origin {
            FileOrigin::Rendered => "rendered from template",
            FileOrigin::TemplateBackup => "backup of existing template policy",
            FileOrigin::ForeignBackup => "backup of existing policy",
        };
        body.push_str(&format!("- `{}` ({origin})\n", file.path));
    }
    if variant == ChangeVariant::Backup {
        body.push_str("\nThis change captures live cluster state and requires a manual review and merge.\n");
    }
    body
}
