//! # Path Builder
//!
//! Builds unencoded URL path segments for provider API operations.

use crate::errors::PathBuilderError;
use crate::operations::Operation;
use crate::provider::Provider;

/// Builder for provider API paths
///
/// # Example
///
/// ```
/// use paths::{Operation, PathBuilder, Provider};
///
/// let segments = PathBuilder::new(Provider::GitHub)
///     .repository("acme/network-policies")
///     .operation(Operation::MergePullRequest)
///     .number(42)
///     .build_segments()
///     .unwrap();
/// assert_eq!(segments, ["repos", "acme", "network-policies", "pulls", "42", "merge"]);
/// ```
#[derive(Debug, Clone)]
pub struct PathBuilder {
    provider: Provider,
    repository: Option<String>,
    operation: Operation,
    number: Option<u64>,
    branch: Option<String>,
}

impl PathBuilder {
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            repository: None,
            operation: Operation::ListPullRequests,
            number: None,
            branch: None,
        }
    }

    /// Repository path as it appears in the clone URL (`owner/name`, or a nested GitLab group path)
    #[must_use]
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Build the path segments
    ///
    /// Segments are not percent-encoded. A GitLab project path is a single
    /// segment (`group/sub/repo`), as are GitLab and Bitbucket branch names;
    /// GitHub ref names are split on `/` because the refs API takes them literally.
    pub fn build_segments(&self) -> Result<Vec<String>, PathBuilderError> {
        let repository = self
            .repository
            .as_deref()
            .map(|r| r.trim_matches('/'))
            .filter(|r| !r.is_empty())
            .ok_or(PathBuilderError::MissingRepository)?;

        let number = if self.operation.requires_number() {
            Some(
                self.number
                    .ok_or(PathBuilderError::MissingNumber(self.operation))?
                    .to_string(),
            )
        } else {
            None
        };

        let branch = if self.operation == Operation::DeleteBranch {
            Some(
                self.branch
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .ok_or(PathBuilderError::MissingBranch(self.operation))?,
            )
        } else {
            None
        };

        match self.provider {
            Provider::GitHub => {
                let (owner, name) = split_owner_name(repository)?;
                let mut segments = vec!["repos".to_string(), owner.to_string(), name.to_string()];
                match self.operation {
                    Operation::CreatePullRequest | Operation::ListPullRequests => {
                        segments.push("pulls".to_string());
                    }
                    Operation::GetPullRequest => {
                        segments.push("pulls".to_string());
                        segments.extend(number);
                    }
                    Operation::MergePullRequest => {
                        segments.push("pulls".to_string());
                        segments.extend(number);
                        segments.push("merge".to_string());
                    }
                    Operation::AddLabels => {
                        segments.push("issues".to_string());
                        segments.extend(number);
                        segments.push("labels".to_string());
                    }
                    Operation::DeleteBranch => {
                        segments.extend(["git", "refs", "heads"].map(String::from));
                        segments.extend(
                            branch
                                .unwrap_or_default()
                                .split('/')
                                .map(ToString::to_string),
                        );
                    }
                }
                Ok(segments)
            }
            Provider::GitLab => {
                if !repository.contains('/') {
                    return Err(PathBuilderError::InvalidRepository(repository.to_string()));
                }
                let mut segments = vec!["projects".to_string(), repository.to_string()];
                match self.operation {
                    Operation::CreatePullRequest | Operation::ListPullRequests => {
                        segments.push("merge_requests".to_string());
                    }
                    Operation::GetPullRequest => {
                        segments.push("merge_requests".to_string());
                        segments.extend(number);
                    }
                    Operation::MergePullRequest => {
                        segments.push("merge_requests".to_string());
                        segments.extend(number);
                        segments.push("merge".to_string());
                    }
                    Operation::AddLabels => {
                        return Err(PathBuilderError::UnsupportedOperation {
                            provider: self.provider,
                            operation: self.operation,
                        });
                    }
                    Operation::DeleteBranch => {
                        segments.extend(["repository", "branches"].map(String::from));
                        segments.extend(branch.map(ToString::to_string));
                    }
                }
                Ok(segments)
            }
            Provider::Bitbucket => {
                let (workspace, name) = split_owner_name(repository)?;
                let mut segments = vec![
                    "repositories".to_string(),
                    workspace.to_string(),
                    name.to_string(),
                ];
                match self.operation {
                    Operation::CreatePullRequest | Operation::ListPullRequests => {
                        segments.push("pullrequests".to_string());
                    }
                    Operation::GetPullRequest => {
                        segments.push("pullrequests".to_string());
                        segments.extend(number);
                    }
                    Operation::MergePullRequest => {
                        segments.push("pullrequests".to_string());
                        segments.extend(number);
                        segments.push("merge".to_string());
                    }
                    Operation::AddLabels => {
                        return Err(PathBuilderError::UnsupportedOperation {
                            provider: self.provider,
                            operation: self.operation,
                        });
                    }
                    Operation::DeleteBranch => {
                        segments.extend(["refs", "branches"].map(String::from));
                        segments.extend(branch.map(ToString::to_string));
                    }
                }
                Ok(segments)
            }
        }
    }

    /// Build the unencoded HTTP path (`/` + segments), mainly for logging
    pub fn build_http_path(&self) -> Result<String, PathBuilderError> {
        Ok(format!("/{}", self.build_segments()?.join("/")))
    }
}

fn split_owner_name(repository: &str) -> Result<(&str, &str), PathBuilderError> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(PathBuilderError::InvalidRepository(repository.to_string())),
    }
}
