//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Field manager used for status patches and dry-run creates
pub const FIELD_MANAGER: &str = "netpol-gitops-controller";

/// Default HTTP port for metrics and health endpoints
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Readiness poll interval while waiting for the metrics server (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Timeout for a single provider API request (seconds)
pub const DEFAULT_GIT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Requeue delay after a failed reconciliation (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Identity used for commits when the credentials secret carries none
pub const DEFAULT_GIT_USERNAME: &str = "netpol-gitops-operator";
pub const DEFAULT_GIT_EMAIL: &str = "netpol-gitops-operator@noreply.local";

/// Replacement text for redacted credential material
pub const REDACTED: &str = "[REDACTED]";

/// Root directory of rendered policies inside the GitOps repository
pub const NETWORK_POLICIES_DIR: &str = "networkpolicies";

/// Kustomization index file name
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Annotation keys stamped on rendered policies
pub const ANNOTATION_TEMPLATE: &str = "gitops.netpol.io/template";
pub const ANNOTATION_TEMPLATE_PATH: &str = "gitops.netpol.io/template-path";
pub const ANNOTATION_TEMPLATE_VERSION: &str = "gitops.netpol.io/template-version";

/// Attempts for a conflict-checked status update
pub const STATUS_UPDATE_MAX_ATTEMPTS: u32 = 3;

/// Backoff between conflicting status update attempts (milliseconds)
pub const STATUS_UPDATE_BACKOFF_MS: u64 = 200;

/// Merge-state polls after an auto-merge attempt
pub const MERGE_POLL_ATTEMPTS: u32 = 3;

/// Namespaces checked per drift batch in the periodic sweep
pub const DRIFT_BATCH_SIZE: usize = 10;

/// Pause between drift batches in the periodic sweep (seconds)
pub const DRIFT_BATCH_DELAY_SECS: u64 = 2;
