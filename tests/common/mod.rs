//! Shared fixtures for the integration tests
//!
//! - [`MemoryCluster`]: in-memory `ClusterAccess` with resource-version checks
//! - fake GitHub, GitLab and Bitbucket REST servers on `127.0.0.1:0`
//! - local bare Git repositories served over `file://`

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use netpol_gitops_controller::config::ControllerConfig;
use netpol_gitops_controller::controller::cluster::{ClusterAccess, ClusterError};
use netpol_gitops_controller::controller::reconciler::Reconciler;
use netpol_gitops_controller::crd::{
    NetworkPolicyGitOps, NetworkPolicyGitOpsSpec, NetworkPolicyGitOpsStatus,
};
use netpol_gitops_controller::observability::metrics::GitOpsMetrics;
use paths::routes;
use prometheus::Registry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path as FsPath, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const TOKEN: &str = "ghp_s3cr3tT0kenValue1234567890";
pub const RESOURCE_NAMESPACE: &str = "netpol-gitops-system";
pub const RESOURCE_NAME: &str = "prod-policies";
pub const SECRET_NAME: &str = "git-credentials";

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

/// In-memory cluster: Secrets, NetworkPolicies and NetworkPolicyGitOps resources
#[derive(Debug, Default)]
pub struct MemoryCluster {
    secrets: Mutex<BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>>,
    policies: Mutex<BTreeMap<String, Vec<NetworkPolicy>>>,
    configs: Mutex<BTreeMap<(String, String), NetworkPolicyGitOps>>,
    /// Policy names the dry-run rejects
    rejected: Mutex<HashSet<String>>,
    /// Status writes that fail with a conflict before any succeeds
    forced_conflicts: AtomicU32,
    pub status_writes: AtomicU32,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let data = data
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
            .collect();
        self.secrets
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn insert_policy(&self, policy: NetworkPolicy) {
        let namespace = policy.metadata.namespace.clone().unwrap();
        self.policies
            .lock()
            .unwrap()
            .entry(namespace)
            .or_default()
            .push(policy);
    }

    pub fn clear_policies(&self, namespace: &str) {
        self.policies.lock().unwrap().remove(namespace);
    }

    pub fn reject_policy(&self, name: &str) {
        self.rejected.lock().unwrap().insert(name.to_string());
    }

    pub fn insert_config(&self, mut config: NetworkPolicyGitOps) {
        config.metadata.resource_version = Some("1".to_string());
        let key = (
            config.metadata.namespace.clone().unwrap(),
            config.metadata.name.clone().unwrap(),
        );
        self.configs.lock().unwrap().insert(key, config);
    }

    pub fn config(&self) -> NetworkPolicyGitOps {
        self.configs
            .lock()
            .unwrap()
            .get(&(RESOURCE_NAMESPACE.to_string(), RESOURCE_NAME.to_string()))
            .cloned()
            .unwrap()
    }

    pub fn status(&self) -> NetworkPolicyGitOpsStatus {
        self.config().status.unwrap_or_default()
    }

    /// Replace the stored spec, as a user edit would
    pub fn update_spec(&self, edit: impl FnOnce(&mut NetworkPolicyGitOpsSpec)) {
        let mut configs = self.configs.lock().unwrap();
        let config = configs
            .get_mut(&(RESOURCE_NAMESPACE.to_string(), RESOURCE_NAME.to_string()))
            .unwrap();
        edit(&mut config.spec);
        bump(config);
    }

    /// Make the next `count` status writes conflict as if another writer won
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }
}

fn bump(config: &mut NetworkPolicyGitOps) {
    let version: u64 = config
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    config.metadata.resource_version = Some((version + 1).to_string());
}

#[async_trait]
impl ClusterAccess for MemoryCluster {
    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ClusterError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicy>, ClusterError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn dry_run_create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), ClusterError> {
        let name = policy.metadata.name.clone().unwrap_or_default();
        if self.rejected.lock().unwrap().contains(&name) {
            return Err(ClusterError::Api(format!(
                "admission webhook denied {namespace}/{name}"
            )));
        }
        Ok(())
    }

    async fn get_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicyGitOps, ClusterError> {
        self.configs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{namespace}/{name}")))
    }

    async fn update_config_status(
        &self,
        config: &NetworkPolicyGitOps,
    ) -> Result<NetworkPolicyGitOps, ClusterError> {
        let key = (
            config.metadata.namespace.clone().unwrap_or_default(),
            config.metadata.name.clone().unwrap_or_default(),
        );
        let mut configs = self.configs.lock().unwrap();
        let stored = configs
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{}/{}", key.0, key.1)))?;

        if self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bump(stored);
            return Err(ClusterError::Conflict("the object has been modified".into()));
        }
        if stored.metadata.resource_version != config.metadata.resource_version {
            return Err(ClusterError::Conflict("the object has been modified".into()));
        }

        stored.status = config.status.clone();
        bump(stored);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Spec pointing at `repo_url` with the provider API at `api_base`, delays disabled
pub fn spec_json(repo_url: &str, api_base: &str, namespaces: &[&str]) -> Value {
    json!({
        "namespaces": namespaces,
        "gitRepository": {
            "url": repo_url,
            "provider": "github",
            "apiBaseUrl": api_base,
            "baseBranch": "main",
            "clusterName": "prod",
            "credentialsSecretRef": { "name": SECRET_NAME, "namespace": RESOURCE_NAMESPACE }
        },
        "batchProcessing": {
            "batchSize": 5,
            "sleepBetweenNamespaces": "0s",
            "sleepBetweenBatches": "0s"
        },
        "autoMerge": { "enabled": false, "waitBeforeMerge": "0s" }
    })
}

pub fn gitops_config(spec: Value, status: Option<NetworkPolicyGitOpsStatus>) -> NetworkPolicyGitOps {
    let spec: NetworkPolicyGitOpsSpec = serde_json::from_value(spec).unwrap();
    let mut config = NetworkPolicyGitOps::new(RESOURCE_NAME, spec);
    config.metadata.namespace = Some(RESOURCE_NAMESPACE.to_string());
    config.metadata.generation = Some(1);
    config.status = status;
    config
}

pub fn reconciler(cluster: Arc<MemoryCluster>) -> (Reconciler, Registry) {
    let registry = Registry::new();
    let metrics = Arc::new(GitOpsMetrics::new(&registry).unwrap());
    let reconciler = Reconciler::new(cluster, metrics, ControllerConfig::default()).unwrap();
    (reconciler, registry)
}

/// Value of a counter family in `registry`, summed over labels
pub fn counter(registry: &Registry, name: &str) -> f64 {
    let text = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    text.lines()
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('{'))
        })
        .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
        .sum()
}

pub fn network_policy(yaml: &str) -> NetworkPolicy {
    serde_yaml::from_str(yaml).unwrap()
}

pub const ALLOW_DNS_TEMPLATE: &str = r"apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: allow-dns
spec:
  podSelector: {}
  policyTypes:
  - Egress
  egress:
  - to:
    - namespaceSelector:
        matchLabels:
          kubernetes.io/metadata.name: kube-system
    ports:
    - port: 53
      protocol: UDP
    - port: 53
      protocol: TCP
";

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Bare repository at `<tmp>/acme/policies.git` seeded with one commit on `main`
#[derive(Debug)]
pub struct GitFixture {
    _dir: TempDir,
    pub bare: PathBuf,
    pub url: String,
}

impl GitFixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_symlinks(files, &[])
    }

    /// Like [`GitFixture::new`], also committing `(link, target)` symlinks
    pub fn with_symlinks(files: &[(&str, &str)], links: &[(&str, &FsPath)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("acme").join("policies.git");
        std::fs::create_dir_all(&bare).unwrap();
        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = dir.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["checkout", "--quiet", "-b", "main"]);
        for (path, contents) in files {
            let target = seed.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, contents).unwrap();
        }
        for (link, target) in links {
            let link = seed.join(link);
            std::fs::create_dir_all(link.parent().unwrap()).unwrap();
            std::os::unix::fs::symlink(target, link).unwrap();
        }
        std::fs::write(seed.join("README.md"), "policies\n").unwrap();
        git(&seed, &["add", "-A"]);
        git(
            &seed,
            &[
                "-c",
                "user.name=seed",
                "-c",
                "user.email=seed@example.com",
                "commit",
                "--quiet",
                "-m",
                "seed",
            ],
        );
        git(&seed, &["push", "--quiet", bare.to_str().unwrap(), "main"]);

        let url = format!("file://{}", bare.display());
        Self {
            _dir: dir,
            bare,
            url,
        }
    }

    /// Push `branch`, forked from `main` with `files` added, as another client would
    pub fn push_branch(&self, branch: &str, files: &[(&str, &str)]) {
        let work = tempfile::tempdir().unwrap();
        git(work.path(), &["clone", "--quiet", self.bare.to_str().unwrap(), "."]);
        git(work.path(), &["checkout", "--quiet", "-b", branch]);
        for (path, contents) in files {
            let target = work.path().join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, contents).unwrap();
        }
        git(work.path(), &["add", "-A"]);
        git(
            work.path(),
            &[
                "-c",
                "user.name=someone",
                "-c",
                "user.email=someone@example.com",
                "commit",
                "--quiet",
                "-m",
                "earlier attempt",
            ],
        );
        git(work.path(), &["push", "--quiet", "origin", branch]);
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        Command::new("git")
            .current_dir(&self.bare)
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// Files on `branch`, repository-relative
    pub fn files(&self, branch: &str) -> Vec<String> {
        git(&self.bare, &["ls-tree", "-r", "--name-only", branch])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn show(&self, branch: &str, path: &str) -> String {
        git(&self.bare, &["show", &format!("{branch}:{path}")])
    }
}

fn git(dir: &FsPath, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// Provider servers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeState {
    Open,
    Merged,
    Declined,
}

#[derive(Debug, Clone)]
pub struct FakePull {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub source: String,
    pub target: String,
    pub labels: Vec<String>,
    pub state: FakeState,
}

/// What a fake provider has been asked to do
#[derive(Debug, Default)]
pub struct FakeProvider {
    pub pulls: Vec<FakePull>,
    pub deleted_branches: Vec<String>,
    pub merge_calls: Vec<u64>,
    pub authorization: Vec<String>,
    /// Answer every request with this status and body
    pub fail_with: Option<(u16, String)>,
}

impl FakeProvider {
    /// Record a pull request created before the test started
    pub fn seed(&mut self, source: &str, state: FakeState) -> u64 {
        let number = self.open("earlier", "", source, "main").number;
        if let Some(pull) = self.pull_mut(number) {
            pull.state = state;
        }
        number
    }

    fn open(&mut self, title: &str, description: &str, source: &str, target: &str) -> FakePull {
        let pull = FakePull {
            number: self.pulls.len() as u64 + 1,
            title: title.to_string(),
            description: description.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            labels: Vec::new(),
            state: FakeState::Open,
        };
        self.pulls.push(pull.clone());
        pull
    }

    fn pull_mut(&mut self, number: u64) -> Option<&mut FakePull> {
        self.pulls.iter_mut().find(|p| p.number == number)
    }

    fn record(&mut self, headers: &HeaderMap) -> Option<(StatusCode, String)> {
        for name in ["authorization", "private-token"] {
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                self.authorization.push(format!("{name}: {value}"));
            }
        }
        self.fail_with
            .clone()
            .map(|(status, body)| (StatusCode::from_u16(status).unwrap(), body))
    }
}

pub type Shared = Arc<Mutex<FakeProvider>>;

/// Serve `router` on an ephemeral port; returns its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{address}")
}

macro_rules! fail_fast {
    ($state:expr, $headers:expr) => {
        if let Some((status, body)) = $state.lock().unwrap().record(&$headers) {
            return (status, body).into_response();
        }
    };
}

// GitHub

fn github_json(pull: &FakePull) -> Value {
    json!({
        "number": pull.number,
        "state": if pull.state == FakeState::Open { "open" } else { "closed" },
        "merged": pull.state == FakeState::Merged,
        "merged_at": if pull.state == FakeState::Merged { json!("2026-01-01T00:00:00Z") } else { Value::Null },
        "html_url": format!("https://github.com/acme/policies/pull/{}", pull.number),
        "head": { "ref": pull.source },
        "base": { "ref": pull.target },
    })
}

#[derive(Debug, Deserialize)]
struct GitHubCreate {
    title: String,
    head: String,
    base: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabels {
    labels: Vec<String>,
}

pub async fn github_server() -> (String, Shared) {
    let state = Shared::default();
    let router = Router::new()
        .route(routes::github::PULLS, post(github_create).get(github_list))
        .route(routes::github::PULL, get(github_get))
        .route(routes::github::MERGE, put(github_merge))
        .route(routes::github::LABELS, post(github_labels))
        .route(routes::github::BRANCH_REF, delete(github_delete_branch))
        .with_state(Arc::clone(&state));
    (serve(router).await, state)
}

async fn github_create(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo)): Path<(String, String)>,
    Json(body): Json<GitHubCreate>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let pull = state
        .lock()
        .unwrap()
        .open(&body.title, &body.body, &body.head, &body.base);
    (StatusCode::CREATED, Json(github_json(&pull))).into_response()
}

async fn github_list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, _repo)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let head = query.get("head").cloned().unwrap_or_default();
    let open_only = query.get("state").is_some_and(|s| s == "open");
    let pulls: Vec<Value> = state
        .lock()
        .unwrap()
        .pulls
        .iter()
        .filter(|p| format!("{owner}:{}", p.source) == head)
        .filter(|p| !open_only || p.state == FakeState::Open)
        .map(github_json)
        .collect();
    Json(pulls).into_response()
}

async fn github_get(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    match guard.pull_mut(number) {
        Some(pull) => Json(github_json(pull)).into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#).into_response(),
    }
}

async fn github_merge(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    guard.merge_calls.push(number);
    match guard.pull_mut(number) {
        Some(pull) => {
            pull.state = FakeState::Merged;
            Json(json!({ "merged": true })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn github_labels(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
    Json(body): Json<GitHubLabels>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    if let Some(pull) = guard.pull_mut(number) {
        pull.labels.extend(body.labels);
    }
    Json(json!([])).into_response()
}

async fn github_delete_branch(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, branch)): Path<(String, String, String)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    state.lock().unwrap().deleted_branches.push(branch);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        r#"{"message":"Reference does not exist"}"#,
    )
        .into_response()
}

// GitLab

fn gitlab_json(pull: &FakePull) -> Value {
    json!({
        "iid": pull.number,
        "state": match pull.state {
            FakeState::Open => "opened",
            FakeState::Merged => "merged",
            FakeState::Declined => "closed",
        },
        "web_url": format!("https://gitlab.example.com/group/sub/policies/-/merge_requests/{}", pull.number),
        "source_branch": pull.source,
        "target_branch": pull.target,
    })
}

#[derive(Debug, Deserialize)]
struct GitLabCreate {
    title: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    labels: Option<String>,
}

pub async fn gitlab_server() -> (String, Shared) {
    let state = Shared::default();
    let router = Router::new()
        .route(
            routes::gitlab::MERGE_REQUESTS,
            post(gitlab_create).get(gitlab_list),
        )
        .route(routes::gitlab::MERGE_REQUEST, get(gitlab_get))
        .route(routes::gitlab::MERGE, put(gitlab_merge))
        .route(routes::gitlab::BRANCH, delete(gitlab_delete_branch))
        .with_state(Arc::clone(&state));
    (serve(router).await, state)
}

async fn gitlab_create(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(project): Path<String>,
    Json(body): Json<GitLabCreate>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    assert_eq!(project, "group/sub/policies");
    let mut guard = state.lock().unwrap();
    let mut pull = guard.open(
        &body.title,
        &body.description,
        &body.source_branch,
        &body.target_branch,
    );
    if let Some(labels) = body.labels {
        pull.labels = labels.split(',').map(str::to_string).collect();
        if let Some(stored) = guard.pull_mut(pull.number) {
            stored.labels.clone_from(&pull.labels);
        }
    }
    (StatusCode::CREATED, Json(gitlab_json(&pull))).into_response()
}

async fn gitlab_list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_project): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let source = query.get("source_branch").cloned().unwrap_or_default();
    let pulls: Vec<Value> = state
        .lock()
        .unwrap()
        .pulls
        .iter()
        .filter(|p| p.source == source && p.state == FakeState::Open)
        .map(gitlab_json)
        .collect();
    Json(pulls).into_response()
}

async fn gitlab_get(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_project, iid)): Path<(String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    match guard.pull_mut(iid) {
        Some(pull) => Json(gitlab_json(pull)).into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"message":"404 Not found"}"#).into_response(),
    }
}

async fn gitlab_merge(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_project, iid)): Path<(String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    guard.merge_calls.push(iid);
    match guard.pull_mut(iid) {
        Some(pull) => {
            pull.state = FakeState::Merged;
            let body = gitlab_json(pull);
            Json(body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn gitlab_delete_branch(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_project, branch)): Path<(String, String)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    state.lock().unwrap().deleted_branches.push(branch);
    (StatusCode::NOT_FOUND, r#"{"message":"404 Branch Not Found"}"#).into_response()
}

// Bitbucket

fn bitbucket_json(pull: &FakePull) -> Value {
    json!({
        "id": pull.number,
        "state": match pull.state {
            FakeState::Open => "OPEN",
            FakeState::Merged => "MERGED",
            FakeState::Declined => "DECLINED",
        },
        "links": { "html": { "href": format!("https://bitbucket.org/acme/policies/pull-requests/{}", pull.number) } },
        "source": { "branch": { "name": pull.source } },
        "destination": { "branch": { "name": pull.target } },
    })
}

pub async fn bitbucket_server() -> (String, Shared) {
    let state = Shared::default();
    let router = Router::new()
        .route(
            routes::bitbucket::PULL_REQUESTS,
            post(bitbucket_create).get(bitbucket_list),
        )
        .route(routes::bitbucket::PULL_REQUEST, get(bitbucket_get))
        .route(routes::bitbucket::MERGE, post(bitbucket_merge))
        .route(routes::bitbucket::BRANCH, delete(bitbucket_delete_branch))
        .with_state(Arc::clone(&state));
    (serve(router).await, state)
}

async fn bitbucket_create(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_workspace, _repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let text = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let pull = state.lock().unwrap().open(
        &text("/title"),
        &text("/description"),
        &text("/source/branch/name"),
        &text("/destination/branch/name"),
    );
    (StatusCode::CREATED, Json(bitbucket_json(&pull))).into_response()
}

async fn bitbucket_list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_workspace, _repo)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let q = query.get("q").cloned().unwrap_or_default();
    let values: Vec<Value> = state
        .lock()
        .unwrap()
        .pulls
        .iter()
        .filter(|p| q.contains(&format!("source.branch.name = \"{}\"", p.source)))
        .filter(|p| p.state == FakeState::Open)
        .map(bitbucket_json)
        .collect();
    Json(json!({ "values": values })).into_response()
}

async fn bitbucket_get(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_workspace, _repo, id)): Path<(String, String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    match guard.pull_mut(id) {
        Some(pull) => Json(bitbucket_json(pull)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn bitbucket_merge(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_workspace, _repo, id)): Path<(String, String, u64)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    let mut guard = state.lock().unwrap();
    guard.merge_calls.push(id);
    match guard.pull_mut(id) {
        Some(pull) => {
            pull.state = FakeState::Merged;
            let body = bitbucket_json(pull);
            Json(body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn bitbucket_delete_branch(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_workspace, _repo, branch)): Path<(String, String, String)>,
) -> axum::response::Response {
    fail_fast!(state, headers);
    state.lock().unwrap().deleted_branches.push(branch);
    StatusCode::NOT_FOUND.into_response()
}
