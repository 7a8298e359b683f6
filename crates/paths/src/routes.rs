//! # Route Constants
//!
//! Axum route templates (static literals) for each provider's REST dialect.
//! They mirror what [`crate::PathBuilder`] produces.

/// GitHub REST v3 routes
pub mod github {
    pub const PULLS: &str = "/repos/{owner}/{repo}/pulls";
    pub const PULL: &str = "/repos/{owner}/{repo}/pulls/{number}";
    pub const MERGE: &str = "/repos/{owner}/{repo}/pulls/{number}/merge";
    pub const LABELS: &str = "/repos/{owner}/{repo}/issues/{number}/labels";
    pub const BRANCH_REF: &str = "/repos/{owner}/{repo}/git/refs/heads/{*branch}";
}

/// GitLab REST v4 routes (`{project}` is the URL-encoded full project path)
pub mod gitlab {
    pub const MERGE_REQUESTS: &str = "/projects/{project}/merge_requests";
    pub const MERGE_REQUEST: &str = "/projects/{project}/merge_requests/{iid}";
    pub const MERGE: &str = "/projects/{project}/merge_requests/{iid}/merge";
    pub const BRANCH: &str = "/projects/{project}/repository/branches/{branch}";
}

/// Bitbucket Cloud 2.0 routes
pub mod bitbucket {
    pub const PULL_REQUESTS: &str = "/repositories/{workspace}/{repo}/pullrequests";
    pub const PULL_REQUEST: &str = "/repositories/{workspace}/{repo}/pullrequests/{id}";
    pub const MERGE: &str = "/repositories/{workspace}/{repo}/pullrequests/{id}/merge";
    pub const BRANCH: &str = "/repositories/{workspace}/{repo}/refs/branches/{branch}";
}
