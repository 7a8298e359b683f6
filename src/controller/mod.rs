//! # Controller
//!
//! Cluster access, the GitOps working-copy layer, the reconciler and the
//! metrics and health HTTP server.

pub mod cluster;
pub mod gitops;
pub mod reconciler;
pub mod server;
