//! GitHub repository listing
//!
//! Lists the authenticated user's repositories so a project can be linked to
//! one of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod client;

pub use client::GitHubClient;

/// Errors from the GitHub API
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub rejected the token")]
    Unauthorized,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A repository as returned by `GET /user/repos`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Source of the repositories visible to a token
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Repositories the token can see, most recently updated first
    async fn list_repositories(&self, token: &str) -> Result<Vec<Repository>, GitHubError>;
}
