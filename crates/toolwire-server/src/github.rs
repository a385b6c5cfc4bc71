//! GitHub REST client used by the repository tools.
//!
//! Every failure mode (non-success status, network error, undecodable body)
//! degrades to `None` / an empty list with a `warn!` line. Callers turn that
//! into the "not found" wording the tools return.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toolwire_core::config::GitHubConfig;

/// Media type pinned to the v3 REST API.
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Page size for repository listings (GitHub's maximum).
const PER_PAGE: u32 = 100;

// ─────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────

/// The subset of GitHub's repository object the tools report on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
}

impl Repository {
    /// Language, treating `null` and `""` alike.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref().filter(|l| !l.is_empty())
    }

    /// Description, treating `null` and `""` alike.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }
}

// ─────────────────────────────────────────────
// GitHubService
// ─────────────────────────────────────────────

/// Thin wrapper over the GitHub REST API.
#[derive(Clone, Debug)]
pub struct GitHubService {
    client: Client,
    api_base: String,
}

impl GitHubService {
    pub fn new(config: &GitHubConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        if !config.token.is_empty() {
            match HeaderValue::from_str(&format!("token {}", config.token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "ignoring unusable GitHub token"),
            }
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to a default HTTP client");
                Client::new()
            });

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /repos/{owner}/{repo}`.
    pub async fn get_repository(&self, owner: &str, repo: &str) -> Option<Repository> {
        let url = self.endpoint(&["repos", owner, repo])?;
        self.fetch(url, &[]).await
    }

    /// `GET /users/{username}/repos`, most recently updated first.
    pub async fn get_user_repositories(&self, username: &str) -> Vec<Repository> {
        let Some(url) = self.endpoint(&["users", username, "repos"]) else {
            return Vec::new();
        };
        let per_page = PER_PAGE.to_string();
        self.fetch(url, &[("sort", "updated"), ("per_page", per_page.as_str())])
            .await
            .unwrap_or_default()
    }

    /// API URL with each segment percent-encoded, so user input cannot
    /// escape its path segment.
    fn endpoint(&self, segments: &[&str]) -> Option<Url> {
        let mut url = match Url::parse(&self.api_base) {
            Ok(url) => url,
            Err(e) => {
                warn!(api_base = %self.api_base, error = %e, "invalid GitHub API base");
                return None;
            }
        };
        let Ok(mut path) = url.path_segments_mut() else {
            warn!(api_base = %self.api_base, "GitHub API base cannot take a path");
            return None;
        };
        path.pop_if_empty().extend(segments);
        drop(path);
        Some(url)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Option<T> {
        let url = url.as_str();
        debug!(url = url, "GitHub request");

        let resp = match self.client.get(url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = url, error = %e, "GitHub request failed");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(url = url, status = %status, "GitHub returned an error status");
            return None;
        }

        match resp.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url = url, error = %e, "failed to decode GitHub response");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
