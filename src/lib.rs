//! # NetworkPolicy GitOps Controller
//!
//! A Kubernetes controller that renders NetworkPolicy templates for a declared
//! set of namespaces into a GitOps repository, opens pull requests on GitHub,
//! GitLab or Bitbucket, tracks them through merge and reports drift between
//! the cluster and the repository.
//!
//! ## Overview
//!
//! 1. **Render** - each template in the repository is validated with a
//!    server-side dry-run and stamped into a per-namespace manifest
//! 2. **Back up** - existing cluster policies can be captured into the repository
//! 3. **Commit** - changes land on a per-namespace branch of an ephemeral clone
//! 4. **Review** - a pull request is opened and optionally auto-merged
//! 5. **Observe** - a periodic sweep refreshes PR state and detects drift
//!
//! Status of every namespace is kept on the `NetworkPolicyGitOps` resource.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;

pub use controller::cluster::{ClusterAccess, ClusterError, KubeCluster};
pub use controller::reconciler::{reconcile_cycle, Reconciler, ReconcilerError};
pub use crd::{NetworkPolicyGitOps, NetworkPolicyGitOpsSpec, NetworkPolicyGitOpsStatus};
