//! # GitOps Repository Plumbing
//!
//! Everything that touches the GitOps repository itself: credential lookup,
//! secret scrubbing, the ephemeral working copy, file layout conventions and
//! the kustomization index.

pub mod credentials;
pub mod kustomization;
pub mod layout;
pub mod sanitize;
pub mod working_copy;

pub use credentials::{resolve_credentials, Credentials, CredentialsError};
pub use sanitize::{sanitize, sanitize_error, SanitizedError};
pub use working_copy::{WorkingCopy, WorkingCopyError};
