//! # Cluster Access
//!
//! The narrow read/write/status-update capability the GitOps workflow needs
//! from the Kubernetes API. Production code uses [`KubeCluster`]; tests
//! substitute an in-memory implementation.

use crate::constants::FIELD_MANAGER;
use crate::crd::NetworkPolicyGitOps;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned by the cluster access layer
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist (HTTP 404)
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic concurrency check failed (HTTP 409)
    #[error("conflict: {0}")]
    Conflict(String),
    /// Any other API failure, including admission rejections on dry-run
    #[error("kubernetes API error: {0}")]
    Api(String),
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                ClusterError::NotFound(api_err.message)
            }
            kube::Error::Api(api_err) if api_err.code == 409 => {
                ClusterError::Conflict(api_err.message)
            }
            other => ClusterError::Api(other.to_string()),
        }
    }
}

/// Read/write/status-update capability consumed by the GitOps workflow
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    /// Data of a Secret, `None` if the Secret does not exist
    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ClusterError>;

    /// NetworkPolicies currently in `namespace`
    async fn list_network_policies(&self, namespace: &str)
        -> Result<Vec<NetworkPolicy>, ClusterError>;

    /// Server-side dry-run create of `policy` in `namespace`
    async fn dry_run_create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), ClusterError>;

    /// Latest copy of the parent resource
    async fn get_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicyGitOps, ClusterError>;

    /// Write `config.status`, conditional on `config.metadata.resource_version`
    ///
    /// Fails with [`ClusterError::Conflict`] when the stored resource version differs.
    async fn update_config_status(
        &self,
        config: &NetworkPolicyGitOps,
    ) -> Result<NetworkPolicyGitOps, ClusterError>;
}

/// [`ClusterAccess`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterAccess for KubeCluster {
    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ClusterError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.get_opt(name).await? {
            Some(secret) => Ok(Some(
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| (key, value.0))
                    .collect(),
            )),
            None => Ok(None),
        }
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicy>, ClusterError> {
        let api: Api<NetworkPolicy> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn dry_run_create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<(), ClusterError> {
        let api: Api<NetworkPolicy> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            dry_run: true,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };
        match api.create(&params, policy).await {
            Ok(_) => Ok(()),
            // An object with this name already exists: the manifest itself was accepted
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(()),
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }

    async fn get_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicyGitOps, ClusterError> {
        let api: Api<NetworkPolicyGitOps> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn update_config_status(
        &self,
        config: &NetworkPolicyGitOps,
    ) -> Result<NetworkPolicyGitOps, ClusterError> {
        let namespace = config.metadata.namespace.as_deref().unwrap_or("default");
        let name = config.metadata.name.as_deref().unwrap_or("unknown");
        let api: Api<NetworkPolicyGitOps> = Api::namespaced(self.client.clone(), namespace);

        // resourceVersion in a merge patch is enforced as a precondition by the API server
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": config.metadata.resource_version,
            },
            "status": config.status,
        });

        Ok(api
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?)
    }
}
