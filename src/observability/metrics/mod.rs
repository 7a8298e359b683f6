//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Process-wide registry and text exposition
//! - `gitops_metrics` - The metrics sink injected into the reconciler

pub mod gitops_metrics;
pub mod registry;

pub use gitops_metrics::GitOpsMetrics;
pub use registry::*;
