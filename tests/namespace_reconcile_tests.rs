//! Namespace reconciliation against a local Git repository and a fake GitHub
//!
//! Tests that need `git` return early when it is not installed.

mod common;

use common::*;
use netpol_gitops_controller::controller::gitops::WorkingCopyError;
use netpol_gitops_controller::controller::reconciler::status::update_status_with;
use netpol_gitops_controller::controller::reconciler::{
    reconcile_cycle, reconcile_namespace, CycleSettings, NamespaceOutcome, ReconcilerError,
};
use netpol_gitops_controller::crd::{NamespacePhase, NamespaceStatusEntry, NetworkPolicyGitOpsStatus};
use serde_json::json;
use std::sync::atomic::Ordering;

macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("skipping: git is not installed");
            return;
        }
    };
}

const TEMPLATE_PATH: &str = "networkpolicies/templates/allow-dns.yaml";
const RENDERED_PATH: &str = "networkpolicies/prod/billing/billing-allow-dns.yaml";

fn setup_cluster(spec: serde_json::Value, status: Option<NetworkPolicyGitOpsStatus>) -> std::sync::Arc<MemoryCluster> {
    let cluster = MemoryCluster::new();
    cluster.insert_secret(
        RESOURCE_NAMESPACE,
        SECRET_NAME,
        &[("token", TOKEN), ("username", "policy-bot")],
    );
    cluster.insert_config(gitops_config(spec, status));
    cluster
}

#[tokio::test]
async fn test_new_namespace_opens_pull_request() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    let (reconciler, registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert!(report.processed.failures.is_empty(), "{:?}", report.processed.failures);

    let status = cluster.status();
    let entry = status.entry("billing").expect("billing entry");
    assert_eq!(entry.state, NamespacePhase::PrPending);
    assert_eq!(entry.pr_number, Some(1));
    assert_eq!(entry.pr_branch.as_deref(), Some("networkpolicy/prod/billing"));
    assert!(entry.pr_url.as_deref().is_some_and(|u| !u.is_empty()));
    assert!(status.last_reconcile_time.is_some());
    assert!(status
        .conditions
        .iter()
        .any(|c| c.r#type == "Ready" && c.status == "True"));

    // Committed on the namespace branch, not on main
    let branch = "networkpolicy/prod/billing";
    assert!(repo.branch_exists(branch));
    assert!(repo.files(branch).contains(&RENDERED_PATH.to_string()));
    assert!(!repo.files("main").contains(&RENDERED_PATH.to_string()));

    let rendered = repo.show(branch, RENDERED_PATH);
    assert!(rendered.contains("name: billing-allow-dns"));
    assert!(rendered.contains("namespace: billing"));
    assert!(rendered.contains("gitops.netpol.io/template: allow-dns.yaml"));
    assert!(rendered.contains("gitops.netpol.io/template-version:"));
    assert!(!rendered.contains("status"));

    let index = repo.show(branch, "networkpolicies/prod/kustomization.yaml");
    assert!(index.contains("billing/billing-allow-dns.yaml"));

    let state = github.lock().unwrap();
    assert_eq!(state.pulls.len(), 1);
    assert_eq!(state.pulls[0].source, branch);
    assert_eq!(state.pulls[0].target, "main");
    assert!(state.pulls[0].description.contains(RENDERED_PATH));
    assert!(state.pulls[0].labels.is_empty());
    assert!(state
        .authorization
        .iter()
        .all(|h| h == &format!("authorization: Bearer {TOKEN}")));
    drop(state);

    assert_eq!(counter(&registry, "netpol_gitops_pull_requests_created_total"), 1.0);
}

#[tokio::test]
async fn test_open_pull_request_is_not_duplicated() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let first = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    assert!(matches!(first, NamespaceOutcome::Created { .. }));

    let second = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    assert_eq!(second, NamespaceOutcome::PullRequestOpen { number: 1 });
    assert_eq!(github.lock().unwrap().pulls.len(), 1);

    // A later cycle skips namespaces that already have an entry
    let writes = cluster.status_writes.load(Ordering::SeqCst);
    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert!(report.processed.outcomes.is_empty());
    assert!(cluster.status_writes.load(Ordering::SeqCst) > writes);
    assert_eq!(github.lock().unwrap().pulls.len(), 1);
}

#[tokio::test]
async fn test_existing_files_mean_no_changes() {
    require_git!();
    let repo = GitFixture::new(&[
        (TEMPLATE_PATH, ALLOW_DNS_TEMPLATE),
        (RENDERED_PATH, "kind: NetworkPolicy\n"),
    ]);
    let (api, github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    assert_eq!(outcome, NamespaceOutcome::NoChanges);
    assert!(github.lock().unwrap().pulls.is_empty());
    assert!(cluster.status().entry("billing").is_none());
}

#[tokio::test]
async fn test_rejected_template_is_skipped() {
    require_git!();
    let second_template = ALLOW_DNS_TEMPLATE.replace("allow-dns", "deny-all");
    let repo = GitFixture::new(&[
        (TEMPLATE_PATH, ALLOW_DNS_TEMPLATE),
        ("networkpolicies/templates/deny-all.yaml", &second_template),
    ]);
    let (api, _github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    cluster.reject_policy("billing-deny-all");
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    assert!(matches!(outcome, NamespaceOutcome::Created { .. }));

    let files = repo.files("networkpolicy/prod/billing");
    assert!(files.contains(&RENDERED_PATH.to_string()));
    assert!(!files.iter().any(|f| f.ends_with("billing-deny-all.yaml")));
}

#[tokio::test]
async fn test_existing_policies_are_backed_up_without_auto_merge() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let mut spec = spec_json(&repo.url, &api, &["billing"]);
    spec["backupExisting"] = json!(true);
    spec["autoMerge"] = json!({ "enabled": true, "waitBeforeMerge": "0s" });
    let cluster = setup_cluster(spec, None);
    cluster.insert_policy(network_policy(
        r"
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: legacy-ingress
  namespace: billing
  uid: 6c1f0b1e-0000-0000-0000-000000000000
  resourceVersion: '42'
spec:
  podSelector: {}
  ingress:
  - from:
    - podSelector: {}
",
    ));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    let NamespaceOutcome::Created { entry, variant } = outcome else {
        panic!("expected a pull request, got {outcome:?}");
    };
    assert_eq!(variant.as_str(), "backup");
    assert_eq!(entry.state, NamespacePhase::PrPending);

    let backup = repo.show(
        "networkpolicy/prod/billing",
        "networkpolicies/prod/billing/legacy-ingress.yaml",
    );
    assert!(backup.contains("name: legacy-ingress"));
    assert!(!backup.contains("uid"));
    assert!(!backup.contains("resourceVersion"));

    let state = github.lock().unwrap();
    assert!(state.merge_calls.is_empty());
    assert!(state.pulls[0].labels.is_empty());
}

#[tokio::test]
async fn test_auto_merge_marks_entry_merged() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let mut spec = spec_json(&repo.url, &api, &["billing"]);
    spec["autoMerge"] = json!({ "enabled": true, "label": "auto-merge", "waitBeforeMerge": "0s" });
    let cluster = setup_cluster(spec, None);
    let (reconciler, registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    assert!(matches!(outcome, NamespaceOutcome::Created { .. }));
    assert_eq!(
        cluster.status().entry("billing").map(|e| e.state),
        Some(NamespacePhase::PrMerged)
    );

    let state = github.lock().unwrap();
    assert_eq!(state.merge_calls, vec![1]);
    assert_eq!(state.pulls[0].labels, vec!["auto-merge".to_string()]);
    drop(state);
    assert_eq!(counter(&registry, "netpol_gitops_pull_requests_merged_total"), 1.0);
}

#[tokio::test]
async fn test_removed_namespace_gets_removal_pull_request() {
    require_git!();
    let kustomization = "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n- billing/billing-allow-dns.yaml\n- payments/payments-allow-dns.yaml\n";
    let repo = GitFixture::new(&[
        (TEMPLATE_PATH, ALLOW_DNS_TEMPLATE),
        (RENDERED_PATH, "kind: NetworkPolicy\n"),
        ("networkpolicies/prod/billing/legacy.yaml", "kind: NetworkPolicy\n"),
        ("networkpolicies/prod/payments/payments-allow-dns.yaml", "kind: NetworkPolicy\n"),
        ("networkpolicies/prod/kustomization.yaml", kustomization),
    ]);
    let (api, github) = github_server().await;

    let mut status = NetworkPolicyGitOpsStatus::default();
    let mut merged = NamespaceStatusEntry::new("billing", NamespacePhase::PrMerged);
    merged.pr_number = Some(7);
    status.upsert(merged);
    status.upsert(NamespaceStatusEntry::new("payments", NamespacePhase::PrMerged));
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["payments"]), Some(status));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert!(report.removal.failed.is_empty());
    assert_eq!(report.removal.outcomes.len(), 1);

    let entry = cluster.status().entry("billing").cloned().unwrap();
    assert_eq!(entry.state, NamespacePhase::PrRemoval);
    let branch = "networkpolicy/prod/billing-removal";
    assert_eq!(entry.pr_branch.as_deref(), Some(branch));

    let files = repo.files(branch);
    assert!(!files.iter().any(|f| f.starts_with("networkpolicies/prod/billing/")));
    assert!(files.contains(&"networkpolicies/prod/payments/payments-allow-dns.yaml".to_string()));
    let index = repo.show(branch, "networkpolicies/prod/kustomization.yaml");
    assert!(!index.contains("billing/"));
    assert!(index.contains("payments/payments-allow-dns.yaml"));

    let state = github.lock().unwrap();
    let removal = state.pulls.iter().find(|p| p.source == branch).unwrap();
    assert!(removal.title.contains("remove"));
    assert!(removal.description.contains("networkpolicies/prod/billing/legacy.yaml"));
    drop(state);

    // The open removal PR is neither duplicated nor marked removed by retention
    reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert_eq!(
        cluster.status().entry("billing").map(|e| e.state),
        Some(NamespacePhase::PrRemoval)
    );
    assert_eq!(
        github.lock().unwrap().pulls.iter().filter(|p| p.source == branch).count(),
        1
    );
}

#[tokio::test]
async fn test_removal_without_files_marks_removed() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let mut status = NetworkPolicyGitOpsStatus::default();
    status.upsert(NamespaceStatusEntry::new("billing", NamespacePhase::PrPending));
    let cluster = setup_cluster(spec_json(&repo.url, &api, &[]), Some(status));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();

    let entry = cluster.status().entry("billing").cloned().unwrap();
    assert_eq!(entry.state, NamespacePhase::Removed);
    assert!(entry.removed_at.is_some());
    assert!(github.lock().unwrap().pulls.is_empty());
}

#[tokio::test]
async fn test_missing_credentials_fail_only_that_namespace() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, _github) = github_server().await;
    let cluster = MemoryCluster::new();
    cluster.insert_config(gitops_config(spec_json(&repo.url, &api, &["billing", "payments"]), None));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert_eq!(report.processed.failures.len(), 2);
    assert!(cluster.status().network_policies.is_empty());
    assert!(cluster
        .status()
        .conditions
        .iter()
        .any(|c| c.r#type == "Ready" && c.status == "False"));
}

#[tokio::test]
async fn test_invalid_configuration_sets_ready_false() {
    let (api, _github) = github_server().await;
    let mut spec = spec_json("https://github.com/acme/policies.git", &api, &["billing"]);
    spec["batchProcessing"]["batchSize"] = json!(0);
    let cluster = setup_cluster(spec, None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    let err = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::InvalidConfig(_)));
    let condition = cluster
        .status()
        .conditions
        .into_iter()
        .find(|c| c.r#type == "Ready")
        .unwrap();
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("InvalidConfiguration"));
}

#[tokio::test(start_paused = true)]
async fn test_status_update_retries_conflicts() {
    let cluster = setup_cluster(
        spec_json("https://github.com/acme/policies.git", "http://127.0.0.1:1", &["billing"]),
        None,
    );
    let (reconciler, registry) = reconciler(std::sync::Arc::clone(&cluster));

    cluster.force_conflicts(2);
    update_status_with(&reconciler, RESOURCE_NAMESPACE, RESOURCE_NAME, |status| {
        status.upsert(NamespaceStatusEntry::new("billing", NamespacePhase::PrPending));
    })
    .await
    .unwrap();
    assert_eq!(
        cluster.status().entry("billing").map(|e| e.state),
        Some(NamespacePhase::PrPending)
    );
    assert_eq!(counter(&registry, "netpol_gitops_status_update_conflicts_total"), 2.0);

    cluster.force_conflicts(3);
    let err = update_status_with(&reconciler, RESOURCE_NAMESPACE, RESOURCE_NAME, |status| {
        status.upsert(NamespaceStatusEntry::new("billing", NamespacePhase::PrMerged));
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ReconcilerError::StatusConflict { attempts: 3, .. }));
    assert_eq!(
        cluster.status().entry("billing").map(|e| e.state),
        Some(NamespacePhase::PrPending)
    );
}

#[tokio::test]
async fn test_concurrent_writers_do_not_lose_entries() {
    let cluster = setup_cluster(
        spec_json("https://github.com/acme/policies.git", "http://127.0.0.1:1", &[]),
        None,
    );
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    cluster.force_conflicts(1);

    let writes = ["a", "b", "c", "d"].map(|namespace| {
        let reconciler = &reconciler;
        async move {
            update_status_with(reconciler, RESOURCE_NAMESPACE, RESOURCE_NAME, |status| {
                status.upsert(NamespaceStatusEntry::new(namespace, NamespacePhase::PrPending));
            })
            .await
        }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }
    assert_eq!(cluster.status().network_policies.len(), 4);
}

const LIVE_ALLOW_DNS: &str = r"
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: billing-allow-dns
  namespace: billing
  uid: 0b7e5a52-0000-0000-0000-000000000000
  resourceVersion: '77'
spec:
  podSelector: {}
  policyTypes:
  - Egress
  egress:
  - ports:
    - port: 5353
      protocol: UDP
";

const LEGACY_INGRESS: &str = r"
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: legacy-ingress
  namespace: billing
spec:
  podSelector: {}
";

const COMMITTED_ALLOW_DNS: &str = r"apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: billing-allow-dns
  namespace: billing
spec:
  podSelector: {}
  policyTypes:
  - Egress
";

#[tokio::test]
async fn test_live_template_policy_is_backed_up_without_auto_merge() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let mut spec = spec_json(&repo.url, &api, &["billing"]);
    spec["backupExisting"] = json!(true);
    spec["autoMerge"] = json!({ "enabled": true, "waitBeforeMerge": "0s" });
    let cluster = setup_cluster(spec, None);
    cluster.insert_policy(network_policy(LIVE_ALLOW_DNS));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    let NamespaceOutcome::Created { entry, variant } = outcome else {
        panic!("expected a pull request, got {outcome:?}");
    };
    assert_eq!(variant.as_str(), "backup");
    assert_eq!(entry.state, NamespacePhase::PrPending);

    // The live object, not the template, lands at the rendered path
    let committed = repo.show("networkpolicy/prod/billing", RENDERED_PATH);
    assert!(committed.contains("port: 5353"));
    assert!(!committed.contains("port: 53\n"));
    assert!(!committed.contains("gitops.netpol.io/template"));
    assert!(!committed.contains("uid"));

    let state = github.lock().unwrap();
    assert!(state.merge_calls.is_empty());
    assert!(state.pulls[0].labels.is_empty());
    assert!(state.pulls[0].description.contains("backup of existing template policy"));
}

#[tokio::test]
async fn test_backup_excluded_namespace_still_gets_templates() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let mut spec = spec_json(&repo.url, &api, &["billing"]);
    spec["backupExisting"] = json!(true);
    spec["backupExcludeNamespaces"] = json!(["bill.*"]);
    spec["autoMerge"] = json!({ "enabled": true, "waitBeforeMerge": "0s" });
    let cluster = setup_cluster(spec, None);
    cluster.insert_policy(network_policy(LEGACY_INGRESS));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    let NamespaceOutcome::Created { entry, variant } = outcome else {
        panic!("expected a pull request, got {outcome:?}");
    };
    assert_eq!(variant.as_str(), "new");
    assert_eq!(entry.state, NamespacePhase::PrMerged);

    let files = repo.files("networkpolicy/prod/billing");
    assert!(files.contains(&RENDERED_PATH.to_string()));
    assert!(!files.iter().any(|f| f.ends_with("legacy-ingress.yaml")));
    assert_eq!(github.lock().unwrap().merge_calls, vec![1]);
}

#[tokio::test]
async fn test_excluded_namespace_gets_removal_pull_request() {
    require_git!();
    let repo = GitFixture::new(&[
        (TEMPLATE_PATH, ALLOW_DNS_TEMPLATE),
        (RENDERED_PATH, COMMITTED_ALLOW_DNS),
    ]);
    let (api, github) = github_server().await;
    let mut spec = spec_json(&repo.url, &api, &["billing"]);
    spec["excludeNamespaces"] = json!(["bill.*"]);
    let mut status = NetworkPolicyGitOpsStatus::default();
    status.upsert(NamespaceStatusEntry::new("billing", NamespacePhase::PrMerged));
    let cluster = setup_cluster(spec, Some(status));
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert!(report.processed.outcomes.is_empty());
    assert_eq!(report.removal.outcomes.len(), 1);
    assert!(report.invalid_namespaces.is_empty());

    let entry = cluster.status().entry("billing").cloned().unwrap();
    assert_eq!(entry.state, NamespacePhase::PrRemoval);
    let branch = "networkpolicy/prod/billing-removal";
    assert!(!repo.files(branch).contains(&RENDERED_PATH.to_string()));
    assert!(github.lock().unwrap().pulls.iter().any(|p| p.source == branch));
}

#[tokio::test]
async fn test_periodic_sweep_refreshes_flags_and_checks_drift() {
    require_git!();
    let repo = GitFixture::new(&[
        (TEMPLATE_PATH, ALLOW_DNS_TEMPLATE),
        (RENDERED_PATH, COMMITTED_ALLOW_DNS),
    ]);
    let (api, github) = github_server().await;
    let merged_number = github
        .lock()
        .unwrap()
        .seed("networkpolicy/prod/billing", FakeState::Merged);
    let open_number = github
        .lock()
        .unwrap()
        .seed("networkpolicy/prod/payments", FakeState::Open);

    let now = chrono::Utc::now();
    let mut status = NetworkPolicyGitOpsStatus::default();
    let mut billing = NamespaceStatusEntry::new("billing", NamespacePhase::PrPending);
    billing.pr_number = Some(merged_number);
    billing.created_at = Some(now.to_rfc3339());
    status.upsert(billing);
    let mut payments = NamespaceStatusEntry::new("payments", NamespacePhase::PrPending);
    payments.pr_number = Some(open_number);
    payments.created_at = Some((now - chrono::Duration::days(2)).to_rfc3339());
    status.upsert(payments);

    let mut spec = spec_json(&repo.url, &api, &["billing", "payments"]);
    spec["stalePrThreshold"] = json!("1d");
    let cluster = setup_cluster(spec, Some(status));
    let (reconciler, registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    let sweep = report.sweep.expect("first cycle sweeps");
    assert_eq!(sweep.merged, vec!["billing".to_string()]);
    assert_eq!(sweep.stale, vec!["payments".to_string()]);
    // billing's committed policy is not live
    assert_eq!(sweep.drift.get("billing"), Some(&true));
    assert!(!sweep.drift.contains_key("payments"));
    // Reprocessing finds the template already committed
    assert_eq!(
        sweep.reprocessed.outcomes,
        vec![("billing".to_string(), NamespaceOutcome::NoChanges)]
    );

    let status = cluster.status();
    let billing = status.entry("billing").unwrap();
    assert_eq!(billing.state, NamespacePhase::PrMerged);
    assert_eq!(billing.drift_detected, Some(true));
    assert!(billing.last_drift_check.is_some());
    assert_eq!(status.entry("payments").unwrap().state, NamespacePhase::PrStale);
    assert!(status.last_periodic_sweep_time.is_some());

    assert_eq!(counter(&registry, "netpol_gitops_pull_requests_merged_total"), 1.0);
    assert_eq!(counter(&registry, "netpol_gitops_stale_pull_requests_total"), 1.0);
    assert_eq!(counter(&registry, "netpol_gitops_drift_detected_total"), 1.0);
    assert_eq!(github.lock().unwrap().pulls.len(), 2);

    // Not due again within the interval
    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert!(report.sweep.is_none());
}

#[tokio::test]
async fn test_existing_branch_from_closed_pull_request_is_force_pushed() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let branch = "networkpolicy/prod/billing";
    repo.push_branch(branch, &[("networkpolicies/prod/billing/leftover.yaml", "kind: NetworkPolicy\n")]);
    let (api, github) = github_server().await;
    github.lock().unwrap().seed(branch, FakeState::Declined);
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let outcome = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap();
    let NamespaceOutcome::Created { entry, .. } = outcome else {
        panic!("expected a pull request, got {outcome:?}");
    };
    assert_eq!(entry.pr_number, Some(2));

    // Rebuilt from main: the earlier attempt's commit is gone
    let files = repo.files(branch);
    assert!(files.contains(&RENDERED_PATH.to_string()));
    assert!(!files.iter().any(|f| f.ends_with("leftover.yaml")));

    let state = github.lock().unwrap();
    assert_eq!(state.deleted_branches, vec![branch.to_string()]);
    assert_eq!(state.pulls.len(), 2);
    assert_eq!(state.pulls[1].source, branch);
    assert_eq!(state.pulls[1].state, FakeState::Open);
}

#[tokio::test]
async fn test_invalid_namespace_entry_is_reported_and_others_proceed() {
    require_git!();
    let repo = GitFixture::new(&[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)]);
    let (api, github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing", "Bad_Name"]), None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));

    let report = reconcile_cycle(&reconciler, &cluster.config()).await.unwrap();
    assert_eq!(report.invalid_namespaces, vec!["Bad_Name".to_string()]);
    assert!(report.processed.failures.is_empty());
    assert_eq!(report.failure_count(), 1);

    let status = cluster.status();
    assert_eq!(status.entry("billing").map(|e| e.state), Some(NamespacePhase::PrPending));
    assert!(status.entry("Bad_Name").is_none());
    let ready = status.conditions.iter().find(|c| c.r#type == "Ready").unwrap();
    assert_eq!(ready.status, "False");
    assert!(ready.message.as_deref().is_some_and(|m| m.contains("Bad_Name")));
    assert_eq!(github.lock().unwrap().pulls.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_cluster_directory_is_refused() {
    require_git!();
    let outside = tempfile::tempdir().unwrap();
    let repo = GitFixture::with_symlinks(
        &[(TEMPLATE_PATH, ALLOW_DNS_TEMPLATE)],
        &[("networkpolicies/prod", outside.path())],
    );
    let (api, github) = github_server().await;
    let cluster = setup_cluster(spec_json(&repo.url, &api, &["billing"]), None);
    let (reconciler, _registry) = reconciler(std::sync::Arc::clone(&cluster));
    let settings = CycleSettings::from_resource(&cluster.config()).unwrap();

    let err = reconcile_namespace(&reconciler, &settings, "billing").await.unwrap_err();
    assert!(
        matches!(err, ReconcilerError::WorkingCopy(WorkingCopyError::PathEscape(_))),
        "{err:?}"
    );
    assert!(std::fs::read_dir(outside.path()).unwrap().next().is_none());
    assert!(github.lock().unwrap().pulls.is_empty());
}
