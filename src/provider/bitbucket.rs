//! # Bitbucket Client
//!
//! Bitbucket Cloud 2.0 dialect. Bitbucket has no pull request labels; the
//! requested labels are listed in the description instead.

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
struct BitbucketPullRequest {
    id: u64,
    state: String,
    links: BitbucketLinks,
    source: BitbucketEndpoint,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    html: BitbucketHref,
}

#[derive(Debug, Deserialize)]
struct BitbucketHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketEndpoint {
    branch: BitbucketBranch,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketPage {
    #[serde(default)]
    values: Vec<BitbucketPullRequest>,
}

impl From<BitbucketPullRequest> for PullRequest {
    fn from(pr: BitbucketPullRequest) -> Self {
        PullRequest {
            number: pr.id,
            state: PullRequestState::normalize(&pr.state),
            url: pr.links.html.href,
            source_branch: pr.source.branch.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitbucketClient {
    api: ApiClient,
}

impl BitbucketClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl GitProviderApi for BitbucketClient {
    fn provider(&self) -> Provider {
        Provider::Bitbucket
    }

    async fn create_pull_request(
        &self,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::CreatePullRequest))?;
        let mut description = request.description.clone();
        if !request.labels.is_empty() {
            description.push_str(&format!("\n\nLabels: {}", request.labels.join(", ")));
        }
        let body = json!({
            "title": request.title,
            "description": description,
            "source": { "branch": { "name": request.source_branch } },
            "destination": { "branch": { "name": request.target_branch } },
            "close_source_branch": true,
        });
        let response = self
            .api
            .send(Operation::CreatePullRequest, self.api.post(url).json(&body))
            .await?;
        let pr: PullRequest = self
            .api
            .json::<BitbucketPullRequest>(Operation::CreatePullRequest, response)
            .await?
            .into();
        info!("Created Bitbucket pull request #{}", pr.number);
        Ok(pr)
    }

    async fn find_pull_request_by_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequest>, ProviderError> {
        let url = self.api.url(&self.api.path(Operation::ListPullRequests))?;
        let query = format!("source.branch.name = \"{branch}\" AND state = \"OPEN\"");
        let request = self.api.get(url).query(&[("q", query.as_str())]);
        let Some(response) = self
            .api
            .send_allowing(Operation::ListPullRequests, request, &[StatusCode::NOT_FOUND])
            .await?
        else {
            return Ok(None);
        };
        let page: BitbucketPage = self.api.json(Operation::ListPullRequests, response).await?;
        Ok(page
            .values
            .into_iter()
            .map(PullRequest::from)
            .find(|pr| pr.source_branch == branch && pr.is_open()))
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
        let pr: BitbucketPullRequest = self.api.json(Operation::GetPullRequest, response).await?;
        Ok(Some(pr.into()))
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), ProviderError> {
        let url = self
            .api
            .url(&self.api.path(Operation::MergePullRequest).number(number))?;
        self.api
            .send(
                Operation::MergePullRequest,
                self.api
                    .post(url)
                    .json(&json!({ "merge_strategy": "merge_commit" })),
            )
            .await?;
        info!("Merged Bitbucket pull request #{}", number);
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
