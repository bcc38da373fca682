//! GitHub REST client: dependent file contents and issue creation.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actuator::{IssueRef, IssueTracker};
use crate::context::ContentSource;
use crate::domain::{ActuatorError, FetchError};

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API root
    pub api_url: String,
    /// Token (optional for public reads, required for issues)
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }
}

impl GitHubConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Deserialize)]
struct CreatedIssue {
    number: u64,
    #[serde(default)]
    html_url: String,
}

pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ripple/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        GitHubClient {
            config,
            http_client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(GitHubConfig::from_env())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("X-GitHub-Api-Version", "2022-11-28");
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn contents_url(&self, repo: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            repo,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn fetch_file(&self, repo: &str, path: &str) -> Result<String, FetchError> {
        let url = self.contents_url(repo, path);
        let response = self
            .authorized(self.http_client.get(&url))
            .header(reqwest::header::ACCEPT, "application/vnd.github.raw")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                repo: repo.to_string(),
                path: path.to_string(),
            }),
            status if !status.is_success() => Err(FetchError::Http {
                status: status.as_u16(),
            }),
            _ => {
                let text = response.text().await?;
                debug!(repo, path, bytes = text.len(), "fetched dependent file");
                Ok(text)
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ActuatorError> {
        if self.config.token.is_none() {
            return Err(ActuatorError::NotConfigured {
                what: "GITHUB_TOKEN".to_string(),
            });
        }
        let issue_error = |detail: String| ActuatorError::IssueCreation {
            repo: repo.to_string(),
            detail,
        };
        let url = format!(
            "{}/repos/{}/issues",
            self.config.api_url.trim_end_matches('/'),
            repo
        );
        let response = self
            .authorized(self.http_client.post(&url))
            .json(&NewIssue {
                title,
                body,
                labels,
            })
            .send()
            .await
            .map_err(|e| issue_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(issue_error(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        let created: CreatedIssue = response
            .json()
            .await
            .map_err(|e| issue_error(format!("unreadable response: {e}")))?;
        Ok(IssueRef {
            number: created.number,
            url: created.html_url,
        })
    }
}
