//! # GitHub Client
//!
//! GitHub REST v3 dialect (github.com and GitHub Enterprise Server).

use crate::provider::http::ApiClient;
use crate::provider::types::{CreatePullRequest, ProviderError, PullRequest, PullRequestState};
use crate::provider::GitProviderApi;
use async_trait::async_trait;
use paths::{Operation, Provider};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct GitHubPull {
    number: u64,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
    html_url: String,
    head: GitHubRef,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    name: String,
}

impl From<GitHubPull> for PullRequest {
    fn from(pull: GitHubPull) -> Self {
        let state = if pull.merged == Some(true) || pull.merged_at.is_some() {
            PullRequestState::Merged
        } else {
            PullRequestState::normalize(&pull.state)
        };
        PullRequest {
            number: pull.number,
            state,
            url: pull.html_url,
            source_branch: pull.head.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    api: ApiClient,
}

impl GitHubClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn owner(&self) -> &str {
        self.api
            .repository()
            .split_once('/')
            .map_or(self.api.repository(), |(owner, _)| owner)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::AddLabels).number(number))?;
        self.api
            .send(
                Operation::AddLabels,
                self.api.post(url).json(&json!({ "labels": labels })),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GitProviderApi for GitHubClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn create_pull_request(
        &self,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::CreatePullRequest))?;
        let body = json!({
            "title": request.title,
            "head": request.source_branch,
            "base": request.target_branch,
            "body": request.description,
        });
        let response = self
            .api
            .send(Operation::CreatePullRequest, self.api.post(url).json(&body))
            .await?;
        let pull: PullRequest = self
            .api
            .json::<GitHubPull>(Operation::CreatePullRequest, response)
            .await?
            .into();
        info!("Created GitHub pull request #{}", pull.number);

        // Labels live on the issue side of a pull request
        if !request.labels.is_empty() {
            if let Err(e) = self.add_labels(pull.number, &request.labels).await {
                warn!("Failed to label pull request #{}: {}", pull.number, e);
            }
        }
        Ok(pull)
    }

    async fn find_pull_request_by_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequest>, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::ListPullRequests))?;
        let head = format!("{}:{branch}", self.owner());
        let request = self
            .api
            .get(url)
            .query(&[("state", "open"), ("head", head.as_str())]);
        let Some(response) = self
            .api
            .send_allowing(Operation::ListPullRequests, request, &[StatusCode::NOT_FOUND])
            .await?
        else {
            return Ok(None);
        };
        let pulls: Vec<GitHubPull> = self.api.json(Operation::ListPullRequests, response).await?;
        Ok(pulls
            .into_iter()
            .map(PullRequest::from)
            .find(|pr| pr.source_branch == branch))
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
        let pull: GitHubPull = self.api.json(Operation::GetPullRequest, response).await?;
        Ok(Some(pull.into()))
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::MergePullRequest).number(number))?;
        self.api
            .send(
                Operation::MergePullRequest,
                self.api.put(url).json(&json!({ "merge_method": "merge" })),
            )
            .await?;
        info!("Merged GitHub pull request #{}", number);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::DeleteBranch).branch(branch))?;
        // 422 "Reference does not exist" is GitHub's answer for an already deleted ref
        self.api
            .send_allowing(
                Operation::DeleteBranch,
                self.api.delete(url),
                &[StatusCode::NOT_FOUND, StatusCode::UNPROCESSABLE_ENTITY],
            )
            .await?;
        Ok(())
    }
}
