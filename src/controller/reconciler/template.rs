//! # Template Renderer
//!
//! Turns a NetworkPolicy template from the repository into a namespace-scoped,
//! GitOps-clean manifest.
//!
//! Rendering validates twice with a server-side dry-run: once on the unmodified
//! template (fails fast on malformed templates) and once after stamping
//! (catches namespace-specific admission failures).

use crate::constants::{ANNOTATION_TEMPLATE, ANNOTATION_TEMPLATE_PATH, ANNOTATION_TEMPLATE_VERSION};
use crate::controller::cluster::ClusterAccess;
use crate::controller::gitops::layout;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

const DEFAULT_API_VERSION: &str = "networking.k8s.io/v1";
const DEFAULT_KIND: &str = "NetworkPolicy";

/// Metadata fields that are never declarative
const NON_DECLARATIVE_METADATA: &[&str] = &[
    "managedFields",
    "creationTimestamp",
    "generation",
    "uid",
    "resourceVersion",
    "selfLink",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
    "ownerReferences",
];

/// Annotation prefixes written by Kubernetes itself or its tooling
const INTERNAL_ANNOTATION_PREFIXES: &[&str] = &[
    "kubectl.kubernetes.io/",
    "kubernetes.io/",
    "k8s.io/",
    "deployment.kubernetes.io/",
    "control-plane.alpha.kubernetes.io/",
];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {path} is not a valid NetworkPolicy: {message}")]
    Parse { path: String, message: String },
    #[error("template {path} failed validation: {message}")]
    Validation { path: String, message: String },
    #[error("rendered policy {name} was rejected in namespace {namespace}: {message}")]
    Rejected {
        name: String,
        namespace: String,
        message: String,
    },
    #[error("failed to serialize policy {name}: {message}")]
    Serialize { name: String, message: String },
}

/// A parsed template file
#[derive(Debug, Clone)]
pub struct Template {
    /// File name (`allow-dns.yaml`)
    pub file_name: String,
    /// Repository path of the template
    pub path: String,
    pub policy: NetworkPolicy,
    /// Short content hash identifying this revision of the template
    pub version: String,
}

impl Template {
    pub fn parse(path: &str, content: &str) -> Result<Self, TemplateError> {
        let policy: NetworkPolicy =
            serde_yaml::from_str(content).map_err(|e| TemplateError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(Self {
            file_name,
            path: path.to_string(),
            policy,
            version: template_version(content),
        })
    }

    /// Name of the policy this template renders to in `namespace`
    #[must_use]
    pub fn policy_name(&self, namespace: &str) -> String {
        layout::rendered_policy_name(namespace, &self.file_name)
    }

    /// Stamp identity and provenance for `namespace`
    #[must_use]
    pub fn stamp(&self, namespace: &str) -> NetworkPolicy {
        let mut policy = self.policy.clone();
        policy.metadata.name = Some(self.policy_name(namespace));
        policy.metadata.namespace = Some(namespace.to_string());
        let annotations = policy.metadata.annotations.get_or_insert_with(Default::default);
        annotations.insert(ANNOTATION_TEMPLATE.to_string(), self.file_name.clone());
        annotations.insert(ANNOTATION_TEMPLATE_PATH.to_string(), self.path.clone());
        annotations.insert(ANNOTATION_TEMPLATE_VERSION.to_string(), self.version.clone());
        policy
    }
}

/// First 12 hex digits of the SHA-256 of the template bytes
#[must_use]
pub fn template_version(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

/// Dry-run the unmodified template in `validation_namespace`
pub async fn validate_template(
    cluster: &dyn ClusterAccess,
    template: &Template,
    validation_namespace: &str,
) -> Result<(), TemplateError> {
    let mut candidate = template.policy.clone();
    candidate.metadata.namespace = Some(validation_namespace.to_string());
    if candidate.metadata.name.as_deref().is_none_or(str::is_empty) {
        candidate.metadata.name = Some(layout::template_base(&template.file_name));
    }
    cluster
        .dry_run_create_network_policy(validation_namespace, &candidate)
        .await
        .map_err(|e| TemplateError::Validation {
            path: template.path.clone(),
            message: e.to_string(),
        })
}

/// Validate, stamp, re-validate and serialize `template` for `namespace`
pub async fn render(
    cluster: &dyn ClusterAccess,
    template: &Template,
    namespace: &str,
    validation_namespace: &str,
) -> Result<String, TemplateError> {
    validate_template(cluster, template, validation_namespace).await?;

    let stamped = template.stamp(namespace);
    let name = stamped.metadata.name.clone().unwrap_or_default();
    cluster
        .dry_run_create_network_policy(namespace, &stamped)
        .await
        .map_err(|e| TemplateError::Rejected {
            name: name.clone(),
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;

    debug!("Rendered {} from {}", name, template.path);
    to_gitops_yaml(&stamped)
}

/// Serialize a policy as committed GitOps YAML
pub fn to_gitops_yaml(policy: &NetworkPolicy) -> Result<String, TemplateError> {
    let name = policy.metadata.name.clone().unwrap_or_default();
    let value = serde_json::to_value(policy).map_err(|e| TemplateError::Serialize {
        name: name.clone(),
        message: e.to_string(),
    })?;
    serde_yaml::to_string(&clean_for_gitops(value)).map_err(|e| TemplateError::Serialize {
        name,
        message: e.to_string(),
    })
}

/// Strip everything that is not declarative intent
///
/// `apiVersion`/`kind` are defaulted when absent and never overwritten. `status`
/// is always dropped.
#[must_use]
pub fn clean_for_gitops(value: Value) -> Value {
    let Value::Object(mut object) = value else {
        return value;
    };

    object.remove("status");
    if !object.get("apiVersion").is_some_and(Value::is_string) {
        object.insert("apiVersion".to_string(), Value::from(DEFAULT_API_VERSION));
    }
    if !object.get("kind").is_some_and(Value::is_string) {
        object.insert("kind".to_string(), Value::from(DEFAULT_KIND));
    }

    if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
        for field in NON_DECLARATIVE_METADATA {
            metadata.remove(*field);
        }
        if let Some(Value::Object(annotations)) = metadata.get_mut("annotations") {
            annotations.retain(|key, _| !is_internal_annotation(key));
        }
        drop_if_empty(metadata, "annotations");
        drop_if_empty(metadata, "labels");
    }

    Value::Object(object)
}

fn is_internal_annotation(key: &str) -> bool {
    INTERNAL_ANNOTATION_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

fn drop_if_empty(map: &mut Map<String, Value>, key: &str) {
    let empty = match map.get(key) {
        Some(Value::Object(inner)) => inner.is_empty(),
        Some(Value::Null) => true,
        _ => false,
    };
    if empty {
        map.remove(key);
    }
}
