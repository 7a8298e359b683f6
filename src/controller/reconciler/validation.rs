//! # Validation
//!
//! Validates NetworkPolicyGitOps resources, duration strings and namespace
//! exclusion patterns.

use crate::crd::NetworkPolicyGitOpsSpec;
use anyhow::{Context, Result};
use paths::Provider;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$").expect("duration pattern is valid")
});

static NAMESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("namespace pattern is valid")
});

/// Parse Kubernetes duration string into std::time::Duration
/// Supports formats: "30s", "1m", "5m", "1h", "2h", "1d"
/// Zero is rejected; use [`parse_kubernetes_duration_allow_zero`] for delays that may be disabled
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration = parse_kubernetes_duration_allow_zero(duration_str)?;
    if duration.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_str.trim()
        ));
    }
    Ok(duration)
}

/// Like [`parse_kubernetes_duration`], but `0s` is accepted
pub fn parse_kubernetes_duration_allow_zero(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let interval_lower = duration_trimmed.to_lowercase();
    let captures = DURATION_REGEX.captures(&interval_lower).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30s', '5m', '1h', '30d')",
            duration_trimmed
        )
    })?;

    let number: u64 = captures["number"].parse().with_context(|| {
        format!("Invalid duration number in '{duration_trimmed}'")
    })?;

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        unit => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{}' in duration '{}'. Expected: s, m, h, or d",
                unit,
                duration_trimmed
            ));
        }
    };

    let seconds = number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Duration '{duration_trimmed}' is too large"))?;
    Ok(Duration::from_secs(seconds))
}

/// Namespace matcher built from exact names and regular expressions
///
/// Patterns are anchored: `kube-.*` matches `kube-system` but not `my-kube-system`.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMatcher {
    patterns: Vec<Regex>,
    exact: Vec<String>,
}

impl NamespaceMatcher {
    pub fn new(entries: &[String]) -> Result<Self> {
        let mut matcher = Self::default();
        for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            if NAMESPACE_REGEX.is_match(entry) {
                matcher.exact.push(entry.to_string());
            } else {
                let regex = Regex::new(&format!("^(?:{entry})$"))
                    .with_context(|| format!("Invalid namespace pattern '{entry}'"))?;
                matcher.patterns.push(regex);
            }
        }
        Ok(matcher)
    }

    #[must_use]
    pub fn matches(&self, namespace: &str) -> bool {
        self.exact.iter().any(|e| e == namespace)
            || self.patterns.iter().any(|p| p.is_match(namespace))
    }
}

/// Whether `namespace` is a valid Kubernetes namespace name (RFC 1123 label)
#[must_use]
pub fn is_valid_namespace_name(namespace: &str) -> bool {
    namespace.len() <= 63 && NAMESPACE_REGEX.is_match(namespace)
}

/// Comprehensive validation of NetworkPolicyGitOps spec fields
/// Returns Ok(()) if valid, Err with descriptive message if invalid
///
/// Entries of `namespaces` are checked one by one when the desired set is
/// built; a bad entry only affects itself.
pub fn validate_network_policy_gitops(spec: &NetworkPolicyGitOpsSpec) -> Result<()> {
    let repo = &spec.git_repository;
    if repo.url.trim().is_empty() {
        return Err(anyhow::anyhow!("gitRepository.url cannot be empty"));
    }
    validate_path_component(&repo.cluster_name, "gitRepository.clusterName")?;
    if repo.base_branch.trim().is_empty() {
        return Err(anyhow::anyhow!("gitRepository.baseBranch cannot be empty"));
    }
    if let Some(provider) = repo.provider.as_deref().filter(|p| !p.trim().is_empty()) {
        provider
            .parse::<Provider>()
            .map_err(|e| anyhow::anyhow!("gitRepository.provider: {e}"))?;
    }
    if repo.credentials_secret_ref.name.trim().is_empty()
        || repo.credentials_secret_ref.namespace.trim().is_empty()
    {
        return Err(anyhow::anyhow!(
            "gitRepository.credentialsSecretRef requires name and namespace"
        ));
    }

    if spec.template_dir.trim().is_empty() {
        return Err(anyhow::anyhow!("templateDir cannot be empty"));
    }

    NamespaceMatcher::new(&spec.exclude_namespaces).context("excludeNamespaces")?;
    NamespaceMatcher::new(&spec.backup_exclude_namespaces).context("backupExcludeNamespaces")?;

    if spec.batch_processing.batch_size == 0 {
        return Err(anyhow::anyhow!("batchProcessing.batchSize must be at least 1"));
    }
    parse_kubernetes_duration_allow_zero(&spec.batch_processing.sleep_between_namespaces)
        .context("batchProcessing.sleepBetweenNamespaces")?;
    parse_kubernetes_duration_allow_zero(&spec.batch_processing.sleep_between_batches)
        .context("batchProcessing.sleepBetweenBatches")?;
    parse_kubernetes_duration_allow_zero(&spec.auto_merge.wait_before_merge)
        .context("autoMerge.waitBeforeMerge")?;
    parse_kubernetes_duration(&spec.reconciliation_interval).context("reconciliationInterval")?;
    parse_kubernetes_duration(&spec.stale_pr_threshold).context("stalePrThreshold")?;

    Ok(())
}

/// A single path or branch component: non-empty, no `/`, no `..`
fn validate_path_component(value: &str, field_name: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == "." || trimmed == ".." {
        return Err(anyhow::anyhow!(
            "{field_name} '{trimmed}' must be a single path component"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GitRepositoryConfig, SecretRef};

    fn spec() -> NetworkPolicyGitOpsSpec {
        serde_json::from_value(serde_json::json!({
            "namespaces": ["billing"],
            "gitRepository": {
                "url": "https://github.com/acme/policies.git",
                "clusterName": "prod",
                "credentialsSecretRef": { "name": "git", "namespace": "ops" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse_kubernetes_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_kubernetes_duration("5M").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_kubernetes_duration(" 1h ").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_kubernetes_duration("30d").unwrap(), Duration::from_secs(2_592_000));
        assert!(parse_kubernetes_duration("0s").is_err());
        assert!(parse_kubernetes_duration("1w").is_err());
        assert!(parse_kubernetes_duration("").is_err());
        assert_eq!(
            parse_kubernetes_duration_allow_zero("0s").unwrap(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_namespace_matcher() {
        let matcher =
            NamespaceMatcher::new(&["kube-.*".to_string(), "billing".to_string()]).unwrap();
        assert!(matcher.matches("kube-system"));
        assert!(matcher.matches("billing"));
        assert!(!matcher.matches("my-kube-system"));
        assert!(!matcher.matches("billing-v2"));
        assert!(NamespaceMatcher::new(&["(".to_string()]).is_err());
    }

    #[test]
    fn test_valid_spec() {
        assert!(validate_network_policy_gitops(&spec()).is_ok());
    }

    #[test]
    fn test_bad_namespace_entry_does_not_reject_spec() {
        let mut s = spec();
        s.namespaces = vec!["billing".to_string(), "Bad_Name".to_string()];
        assert!(validate_network_policy_gitops(&s).is_ok());
    }

    #[test]
    fn test_namespace_names() {
        assert!(is_valid_namespace_name("billing"));
        assert!(is_valid_namespace_name("team-a1"));
        assert!(!is_valid_namespace_name("Bad_Name"));
        assert!(!is_valid_namespace_name("../etc"));
        assert!(!is_valid_namespace_name("-lead"));
        assert!(!is_valid_namespace_name(&"a".repeat(64)));
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut s = spec();
        s.batch_processing.batch_size = 0;
        assert!(validate_network_policy_gitops(&s).is_err());

        let mut s = spec();
        s.git_repository = GitRepositoryConfig {
            provider: Some("gitea".to_string()),
            ..s.git_repository
        };
        assert!(validate_network_policy_gitops(&s).is_err());

        let mut s = spec();
        s.git_repository.cluster_name = "prod/../x".to_string();
        assert!(validate_network_policy_gitops(&s).is_err());

        let mut s = spec();
        s.git_repository.credentials_secret_ref = SecretRef {
            name: String::new(),
            namespace: "ops".to_string(),
        };
        assert!(validate_network_policy_gitops(&s).is_err());

        let mut s = spec();
        s.stale_pr_threshold = "soon".to_string();
        assert!(validate_network_policy_gitops(&s).is_err());

        let mut s = spec();
        s.exclude_namespaces = vec!["[".to_string()];
        assert!(validate_network_policy_gitops(&s).is_err());
    }
}
