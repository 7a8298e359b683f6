//! Shared REST API path definitions for GitHub, GitLab, and Bitbucket
//!
//! This crate centralizes all Git hosting API paths to ensure consistency
//! between the controller's provider clients and the fake provider servers
//! used in integration tests.
//!
//! ## PathBuilder
//!
//! The `PathBuilder` provides a type-safe, builder-pattern API for constructing
//! the URL path segments of a pull request or branch operation. Segments are
//! returned unencoded; the caller appends them to a base URL so that each
//! segment is percent-encoded individually (GitLab project paths and branch
//! names contain `/`).
//!
//! ## Route Constants
//!
//! Route constants are provided for Axum routes, which require static string literals.
//! These constants are validated against PathBuilder output in tests.

pub mod builder;
pub mod errors;
pub mod operations;
pub mod provider;
pub mod routes;

// Re-export core types for convenience
pub use builder::PathBuilder;
pub use errors::PathBuilderError;
pub use operations::Operation;
pub use provider::Provider;
