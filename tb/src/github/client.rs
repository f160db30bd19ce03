//! GitHub REST client

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{GitHubError, RepoSource, Repository};
use crate::config::GitHubConfig;

const USER_AGENT: &str = concat!("taskboard/", env!("CARGO_PKG_VERSION"));

/// GitHub API client
pub struct GitHubClient {
    base_url: String,
    per_page: u32,
    max_pages: u32,
    http: Client,
}

impl GitHubClient {
    /// Create a new client from configuration
    pub fn from_config(config: &GitHubConfig) -> Result<Self, GitHubError> {
        debug!(?config, "from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page.clamp(1, 100),
            max_pages: config.max_pages.max(1),
            http,
        })
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/user/repos?sort=updated&per_page={}&page={}",
            self.base_url, self.per_page, page
        )
    }

    async fn fetch_page(&self, token: &str, page: u32) -> Result<Vec<Repository>, GitHubError> {
        let url = self.page_url(page);
        debug!(%url, "fetch_page: called");

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if status == 401 {
            debug!("fetch_page: unauthorized");
            return Err(GitHubError::Unauthorized);
        }
        if !(200..300).contains(&status) {
            debug!(%status, "fetch_page: API error");
            return Err(GitHubError::Api {
                status,
                message: api_message(&text),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn list_repositories(&self, token: &str) -> Result<Vec<Repository>, GitHubError> {
        debug!("list_repositories: called");
        let repos = paginate(self.per_page, self.max_pages, |page| self.fetch_page(token, page)).await?;
        debug!(count = repos.len(), "list_repositories: done");
        Ok(repos)
    }
}

/// Fetch pages starting at 1 until a short page or `max_pages`
async fn paginate<F, Fut>(per_page: u32, max_pages: u32, mut fetch: F) -> Result<Vec<Repository>, GitHubError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<Repository>, GitHubError>>,
{
    let mut repos = Vec::new();
    for page in 1..=max_pages {
        let batch = fetch(page).await?;
        let short = batch.len() < per_page as usize;
        repos.extend(batch);
        if short {
            break;
        }
    }
    Ok(repos)
}

/// Pull `message` out of a GitHub error body, falling back to the raw text
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
