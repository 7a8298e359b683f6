//! # Kustomization Index
//!
//! Maintains the per-cluster `kustomization.yaml` whose `resources` list names
//! every active policy file. The list is kept sorted and free of duplicates;
//! keys other than `resources` are preserved.

use crate::controller::gitops::layout;
use crate::controller::gitops::working_copy::{WorkingCopy, WorkingCopyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
const KIND: &str = "Kustomization";

#[derive(Debug, Error)]
pub enum KustomizationError {
    #[error("invalid kustomization file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to serialize kustomization: {0}")]
    Serialize(#[source] serde_yaml::Error),
    #[error("path {0} is outside the cluster directory")]
    OutsideCluster(String),
    #[error(transparent)]
    WorkingCopy(#[from] WorkingCopyError),
}

/// Parsed kustomization index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Kustomization {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            resources: Vec::new(),
            other: BTreeMap::new(),
        }
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl Kustomization {
    pub fn parse(path: &str, contents: &str) -> Result<Self, KustomizationError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut parsed: Self =
            serde_yaml::from_str(contents).map_err(|source| KustomizationError::Parse {
                path: path.to_string(),
                source,
            })?;
        parsed.normalize();
        Ok(parsed)
    }

    pub fn to_yaml(&self) -> Result<String, KustomizationError> {
        serde_yaml::to_string(self).map_err(KustomizationError::Serialize)
    }

    /// Add `resource`; adding an existing entry is a no-op
    pub fn add(&mut self, resource: &str) {
        self.resources.push(resource.to_string());
        self.normalize();
    }

    /// Remove `resource`; returns whether it was present
    pub fn remove(&mut self, resource: &str) -> bool {
        let before = self.resources.len();
        self.resources.retain(|r| r != resource);
        before != self.resources.len()
    }

    /// Remove every resource under `dir/`; returns how many were removed
    pub fn remove_dir(&mut self, dir: &str) -> usize {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let before = self.resources.len();
        self.resources.retain(|r| !r.starts_with(&prefix));
        before - self.resources.len()
    }

    fn normalize(&mut self) {
        self.resources.sort();
        self.resources.dedup();
    }
}

/// Load the cluster index, creating an empty one if it does not exist
pub async fn ensure(wc: &WorkingCopy, cluster: &str) -> Result<Kustomization, KustomizationError> {
    let path = layout::kustomization_path(cluster);
    if wc.exists(&path).await? {
        let contents = wc.read_file(&path).await?;
        Kustomization::parse(&path, &contents)
    } else {
        let index = Kustomization::default();
        wc.write_file(&path, &index.to_yaml()?).await?;
        Ok(index)
    }
}

/// Register repository file `file_path` in the cluster index
pub async fn add_file(wc: &WorkingCopy, cluster: &str, file_path: &str) -> Result<(), KustomizationError> {
    let resource = layout::kustomization_resource(cluster, file_path)
        .ok_or_else(|| KustomizationError::OutsideCluster(file_path.to_string()))?;
    let mut index = ensure(wc, cluster).await?;
    index.add(&resource);
    wc.write_file(&layout::kustomization_path(cluster), &index.to_yaml()?)
        .await?;
    Ok(())
}

/// Drop every resource of `namespace` from the cluster index
pub async fn remove_namespace(
    wc: &WorkingCopy,
    cluster: &str,
    namespace: &str,
) -> Result<usize, KustomizationError> {
    let path = layout::kustomization_path(cluster);
    if !wc.exists(&path).await? {
        return Ok(0);
    }
    let mut index = Kustomization::parse(&path, &wc.read_file(&path).await?)?;
    let removed = index.remove_dir(namespace);
    if removed > 0 {
        wc.write_file(&path, &index.to_yaml()?).await?;
    }
    Ok(removed)
}
