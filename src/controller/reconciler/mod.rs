//! # Reconciler
//!
//! Drives a NetworkPolicyGitOps resource from its desired namespace set to
//! pull requests in the GitOps repository.
//!
//! ## Sub-modules
//!
//! - `types` - Reconciler context, per-cycle settings and error type
//! - `validation` - Spec validation, durations and namespace matchers
//! - `template` - Template parsing, dry-run validation and rendering
//! - `drift` - Canonical rules hash of NetworkPolicy specs
//! - `status` - Conflict-checked status writes
//! - `namespace` - Per-namespace state machine
//! - `batch` - Batch scheduling of pending namespaces
//! - `removal` - Deletion pull requests for dropped namespaces
//! - `retention` - Pruning of removed status entries
//! - `sweep` - Periodic PR refresh, stale flagging and drift detection
//! - `cycle` - One reconciliation pass over a resource

pub mod batch;
pub mod cycle;
pub mod drift;
pub mod namespace;
pub mod removal;
pub mod retention;
pub mod status;
pub mod sweep;
pub mod template;
pub mod types;
pub mod validation;

pub use cycle::{reconcile_cycle, CycleReport};
pub use namespace::{reconcile_namespace, NamespaceOutcome};
pub use types::{CycleSettings, DesiredNamespaces, Reconciler, ReconcilerError};
