//! # Operations
//!
//! Pull request and branch operations addressed by the path builder.

use std::fmt;

/// Git hosting API operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a pull/merge request
    CreatePullRequest,
    /// List pull/merge requests (filtered by query parameters)
    ListPullRequests,
    /// Get a single pull/merge request by number
    GetPullRequest,
    /// Merge a pull/merge request
    MergePullRequest,
    /// Attach labels to a pull request (GitHub only; others take labels in the create payload)
    AddLabels,
    /// Delete a branch ref
    DeleteBranch,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreatePullRequest => "create_pull_request",
            Operation::ListPullRequests => "list_pull_requests",
            Operation::GetPullRequest => "get_pull_request",
            Operation::MergePullRequest => "merge_pull_request",
            Operation::AddLabels => "add_labels",
            Operation::DeleteBranch => "delete_branch",
        }
    }

    /// Whether the operation addresses a single pull request by number
    #[must_use]
    pub fn requires_number(&self) -> bool {
        matches!(
            self,
            Operation::GetPullRequest | Operation::MergePullRequest | Operation::AddLabels
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
