//! # Repository Layout
//!
//! File and branch naming conventions inside the GitOps repository:
//!
//! ```text
//! networkpolicies/<cluster>/kustomization.yaml
//! networkpolicies/<cluster>/<namespace>/<namespace>-<templateBase>.yaml   (rendered)
//! networkpolicies/<cluster>/<namespace>/<policyName>.yaml                 (backup)
//! ```
//!
//! Branches: `networkpolicy/<cluster>/<namespace>` and
//! `networkpolicy/<cluster>/<namespace>-removal`.

use crate::constants::{KUSTOMIZATION_FILE, NETWORK_POLICIES_DIR};
use std::path::Path;

/// Directory holding everything for one cluster
#[must_use]
pub fn cluster_dir(cluster: &str) -> String {
    format!("{NETWORK_POLICIES_DIR}/{cluster}")
}

/// Directory holding one namespace's policies
#[must_use]
pub fn namespace_dir(cluster: &str, namespace: &str) -> String {
    format!("{}/{namespace}", cluster_dir(cluster))
}

/// The per-cluster kustomization index
#[must_use]
pub fn kustomization_path(cluster: &str) -> String {
    format!("{}/{KUSTOMIZATION_FILE}", cluster_dir(cluster))
}

/// Template file name without its extension (`allow-dns.yaml` -> `allow-dns`)
#[must_use]
pub fn template_base(template_file: &str) -> String {
    Path::new(template_file)
        .file_stem()
        .map_or_else(|| template_file.to_string(), |s| s.to_string_lossy().into_owned())
}

/// Policy name rendered from a template for `namespace`
#[must_use]
pub fn rendered_policy_name(namespace: &str, template_file: &str) -> String {
    format!("{namespace}-{}", template_base(template_file))
}

/// Repository path of a template-derived policy
#[must_use]
pub fn rendered_policy_path(cluster: &str, namespace: &str, template_file: &str) -> String {
    format!(
        "{}/{}.yaml",
        namespace_dir(cluster, namespace),
        rendered_policy_name(namespace, template_file)
    )
}

/// Repository path of a backed-up policy
#[must_use]
pub fn backup_policy_path(cluster: &str, namespace: &str, policy_name: &str) -> String {
    format!("{}/{policy_name}.yaml", namespace_dir(cluster, namespace))
}

/// Kustomization resource entry for a file, relative to the cluster directory
///
/// Returns `None` when `path` is outside the cluster directory.
#[must_use]
pub fn kustomization_resource(cluster: &str, path: &str) -> Option<String> {
    path.strip_prefix(&format!("{}/", cluster_dir(cluster)))
        .map(str::to_string)
}

/// Branch carrying policy additions for `namespace`
#[must_use]
pub fn namespace_branch(cluster: &str, namespace: &str) -> String {
    format!("networkpolicy/{cluster}/{namespace}")
}

/// Branch carrying the removal of `namespace`
#[must_use]
pub fn removal_branch(cluster: &str, namespace: &str) -> String {
    format!("{}-removal", namespace_branch(cluster, namespace))
}
