//! # GitLab Client
//!
//! GitLab REST v4 dialect. Merge requests are addressed by their project-scoped `iid`.

use crate::provider::http::ApiClient;
use crate::provider::types::{CreatePullRequest, ProviderError, PullRequest, PullRequestState};
use crate::provider::GitProviderApi;
use async_trait::async_trait;
use paths::{Operation, Provider};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
struct GitLabMergeRequest {
    iid: u64,
    state: String,
    web_url: String,
    source_branch: String,
}

impl From<GitLabMergeRequest> for PullRequest {
    fn from(mr: GitLabMergeRequest) -> Self {
        PullRequest {
            number: mr.iid,
            state: PullRequestState::normalize(&mr.state),
            url: mr.web_url,
            source_branch: mr.source_branch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitLabClient {
    api: ApiClient,
}

impl GitLabClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl GitProviderApi for GitLabClient {
    fn provider(&self) -> Provider {
        Provider::GitLab
    }

    async fn create_pull_request(
        &self,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::CreatePullRequest))?;
        let mut body = json!({
            "title": request.title,
            "source_branch": request.source_branch,
            "target_branch": request.target_branch,
            "description": request.description,
        });
        if !request.labels.is_empty() {
            body["labels"] = json!(request.labels.join(","));
        }
        let response = self
            .api
            .send(Operation::CreatePullRequest, self.api.post(url).json(&body))
            .await?;
        let mr: PullRequest = self
            .api
            .json::<GitLabMergeRequest>(Operation::CreatePullRequest, response)
            .await?
            .into();
        info!("Created GitLab merge request !{}", mr.number);
        Ok(mr)
    }

    async fn find_pull_request_by_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequest>, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::ListPullRequests))?;
        let request = self
            .api
            .get(url)
            .query(&[("state", "opened"), ("source_branch", branch)]);
        let Some(response) = self
            .api
            .send_allowing(Operation::ListPullRequests, request, &[StatusCode::NOT_FOUND])
            .await?
        else {
            return Ok(None);
        };
        let mrs: Vec<GitLabMergeRequest> =
            self.api.json(Operation::ListPullRequests, response).await?;
        Ok(mrs
            .into_iter()
            .map(PullRequest::from)
            .find(|mr| mr.source_branch == branch && mr.is_open()))
    }

    async fn get_pull_request(&self, number: u64) -> Result<Option<PullRequest>, ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::GetPullRequest).number(number))?;
        let Some(response) = self
            .api
            .send_allowing(
                Operation::GetPullRequest,
                self.api.get(url),
                &[StatusCode::NOT_FOUND],
            )
            .await?
        else {
            return Ok(None);
        };
        let mr: GitLabMergeRequest = self.api.json(Operation::GetPullRequest, response).await?;
        Ok(Some(mr.into()))
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::MergePullRequest).number(number))?;
        self.api
            .send(Operation::MergePullRequest, self.api.put(url))
            .await?;
        info!("Merged GitLab merge request !{}", number);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::DeleteBranch).branch(branch))?;
        self.api
            .send_allowing(
                Operation::DeleteBranch,
                self.api.delete(url),
                &[StatusCode::NOT_FOUND],
            )
            .await?;
        Ok(())
    }
}
