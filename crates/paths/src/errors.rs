//! # Path Builder Errors

use crate::operations::Operation;
use crate::provider::Provider;
use thiserror::Error;

/// Errors produced while building a provider API path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathBuilderError {
    #[error("repository path is required")]
    MissingRepository,
    #[error("repository path '{0}' must have the form '<owner>/<name>'")]
    InvalidRepository(String),
    #[error("operation '{0}' requires a pull request number")]
    MissingNumber(Operation),
    #[error("operation '{0}' requires a branch name")]
    MissingBranch(Operation),
    #[error("operation '{operation}' is not supported by provider '{provider}'")]
    UnsupportedOperation {
        provider: Provider,
        operation: Operation,
    },
    #[error("unknown git provider '{0}' (expected github, gitlab, or bitbucket)")]
    UnknownProvider(String),
}
