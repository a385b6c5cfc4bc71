//! GitHub tools: repository details, user listings and star statistics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use toolwire_core::utils::{ellipsize, format_count};

use super::base::{require_string, Tool};
use crate::github::{GitHubService, Repository};

/// Repositories shown by `get_user_repositories`.
const TOP_REPOSITORIES: usize = 20;

/// Languages shown by `get_user_stars_summary`.
const TOP_LANGUAGES: usize = 5;

/// Descriptions in listings are cut after this many characters.
const DESCRIPTION_LIMIT: usize = 100;

fn no_repositories(username: &str) -> String {
    format!("No repositories found for user {username} or user does not exist.")
}

/// Join lines, each terminated by a newline.
fn render(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn username_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "username": {
                "type": "string",
                "description": "GitHub username"
            }
        },
        "required": ["username"]
    })
}

/// Register-ready list of every GitHub tool sharing one service.
pub fn github_tools(service: Arc<GitHubService>) -> Vec<Arc<dyn Tool>> {
    let repository: Arc<dyn Tool> = Arc::new(RepositoryStarsTool::new(service.clone()));
    let listing: Arc<dyn Tool> = Arc::new(UserRepositoriesTool::new(service.clone()));
    let summary: Arc<dyn Tool> = Arc::new(UserStarsSummaryTool::new(service));
    vec![repository, listing, summary]
}

// ─────────────────────────────────────────────
// get_repository_stars
// ─────────────────────────────────────────────

pub struct RepositoryStarsTool {
    service: Arc<GitHubService>,
}

impl RepositoryStarsTool {
    pub fn new(service: Arc<GitHubService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for RepositoryStarsTool {
    fn name(&self) -> &str {
        "get_repository_stars"
    }

    fn description(&self) -> &str {
        "Get information about a specific GitHub repository, including the number of stars."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "string",
                    "description": "GitHub username or organization name"
                },
                "repositoryName": {
                    "type": "string",
                    "description": "Repository name"
                }
            },
            "required": ["owner", "repositoryName"]
        })
    }

    async fn execute(&self, params: Map<String, Value>) -> anyhow::Result<String> {
        let owner = require_string(&params, "owner")?;
        let repo_name = require_string(&params, "repositoryName")?;
        debug!(owner = %owner, repo = %repo_name, "fetching repository");

        let Some(repo) = self.service.get_repository(&owner, &repo_name).await else {
            return Ok(format!(
                "Repository {owner}/{repo_name} not found or is not accessible."
            ));
        };

        Ok(format_repository(&repo))
    }
}

fn format_repository(repo: &Repository) -> String {
    let mut lines = vec![
        format!("📦 Repository: {}", repo.full_name),
        format!("⭐ Stars: {}", format_count(repo.stargazers_count)),
        format!("🍴 Forks: {}", format_count(repo.forks_count)),
    ];
    if let Some(language) = repo.language() {
        lines.push(format!("💻 Language: {language}"));
    }
    if let Some(description) = repo.description() {
        lines.push(format!("📝 Description: {description}"));
    }
    lines.push(format!("🔗 URL: {}", repo.html_url));
    lines.push(format!("📅 Last Updated: {}", repo.updated_at.format("%Y-%m-%d")));
    render(lines)
}

// ─────────────────────────────────────────────
// get_user_repositories
// ─────────────────────────────────────────────

pub struct UserRepositoriesTool {
    service: Arc<GitHubService>,
}

impl UserRepositoriesTool {
    pub fn new(service: Arc<GitHubService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for UserRepositoriesTool {
    fn name(&self) -> &str {
        "get_user_repositories"
    }

    fn description(&self) -> &str {
        "Get all repositories for a GitHub user with their star counts."
    }

    fn parameters(&self) -> Value {
        username_schema()
    }

    async fn execute(&self, params: Map<String, Value>) -> anyhow::Result<String> {
        let username = require_string(&params, "username")?;
        let repos = self.service.get_user_repositories(&username).await;
        if repos.is_empty() {
            return Ok(no_repositories(&username));
        }
        Ok(format_user_repositories(&username, &repos))
    }
}

fn format_user_repositories(username: &str, repos: &[Repository]) -> String {
    // Totals cover private repositories too; the listing does not.
    let total_stars: u64 = repos.iter().map(|r| r.stargazers_count).sum();
    let total_forks: u64 = repos.iter().map(|r| r.forks_count).sum();

    let mut lines = vec![
        format!("📚 Repositories for {username}:"),
        String::new(),
        "📊 Summary:".to_string(),
        format!("  • Total Repositories: {}", format_count(repos.len() as u64)),
        format!("  • Total Stars: {}", format_count(total_stars)),
        format!("  • Total Forks: {}", format_count(total_forks)),
        String::new(),
        "🏆 Top repositories by stars:".to_string(),
    ];

    let mut public: Vec<&Repository> = repos.iter().filter(|r| !r.private).collect();
    public.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count));

    for repo in public.into_iter().take(TOP_REPOSITORIES) {
        lines.push(format!(
            "  • {} - ⭐ {} stars, 🍴 {} forks",
            repo.name,
            format_count(repo.stargazers_count),
            format_count(repo.forks_count)
        ));
        if let Some(language) = repo.language() {
            lines.push(format!("    Language: {language}"));
        }
        if let Some(description) = repo.description() {
            lines.push(format!(
                "    Description: {}",
                ellipsize(description, DESCRIPTION_LIMIT)
            ));
        }
        lines.push(format!("    URL: {}", repo.html_url));
        lines.push(String::new());
    }

    render(lines)
}

// ─────────────────────────────────────────────
// get_user_stars_summary
// ─────────────────────────────────────────────

pub struct UserStarsSummaryTool {
    service: Arc<GitHubService>,
}

impl UserStarsSummaryTool {
    pub fn new(service: Arc<GitHubService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for UserStarsSummaryTool {
    fn name(&self) -> &str {
        "get_user_stars_summary"
    }

    fn description(&self) -> &str {
        "Get star statistics summary for a GitHub user."
    }

    fn parameters(&self) -> Value {
        username_schema()
    }

    async fn execute(&self, params: Map<String, Value>) -> anyhow::Result<String> {
        let username = require_string(&params, "username")?;
        let repos = self.service.get_user_repositories(&username).await;
        if repos.is_empty() {
            return Ok(no_repositories(&username));
        }
        Ok(format_stars_summary(&username, &repos))
    }
}

struct LanguageStats<'a> {
    language: &'a str,
    repos: usize,
    stars: u64,
}

/// Per-language totals, highest star count first. Ties keep first-seen order.
fn language_stats<'a>(repos: &[&'a Repository]) -> Vec<LanguageStats<'a>> {
    let mut stats: Vec<LanguageStats<'a>> = Vec::new();
    for &repo in repos {
        let Some(language) = repo.language() else {
            continue;
        };
        match stats.iter_mut().find(|s| s.language == language) {
            Some(entry) => {
                entry.repos += 1;
                entry.stars += repo.stargazers_count;
            }
            None => stats.push(LanguageStats {
                language,
                repos: 1,
                stars: repo.stargazers_count,
            }),
        }
    }
    stats.sort_by(|a, b| b.stars.cmp(&a.stars));
    stats
}

fn format_stars_summary(username: &str, repos: &[Repository]) -> String {
    let public: Vec<&Repository> = repos.iter().filter(|r| !r.private).collect();
    let total_stars: u64 = public.iter().map(|r| r.stargazers_count).sum();
    let total_forks: u64 = public.iter().map(|r| r.forks_count).sum();
    let average = if public.is_empty() {
        0.0
    } else {
        total_stars as f64 / public.len() as f64
    };

    let mut lines = vec![
        format!("📊 GitHub Stars Summary for {username}"),
        "═".repeat(50),
        String::new(),
        "📈 Overall Statistics:".to_string(),
        format!("  • Total Public Repositories: {}", format_count(public.len() as u64)),
        format!("  • Total Stars: {}", format_count(total_stars)),
        format!("  • Total Forks: {}", format_count(total_forks)),
        format!("  • Average Stars per Repo: {average:.1}"),
        String::new(),
    ];

    // First of the maximal entries, as a stable descending sort would give.
    let most_starred = public
        .iter()
        .copied()
        .fold(None::<&Repository>, |best, repo| match best {
            Some(b) if b.stargazers_count >= repo.stargazers_count => Some(b),
            _ => Some(repo),
        });
    if let Some(repo) = most_starred {
        lines.push("🏆 Most Starred Repository:".to_string());
        lines.push(format!(
            "  • {} - {} stars",
            repo.name,
            format_count(repo.stargazers_count)
        ));
        lines.push(format!("  • {}", repo.html_url));
        lines.push(String::new());
    }

    let languages = language_stats(&public);
    if !languages.is_empty() {
        lines.push("💻 Top Languages by Stars:".to_string());
        for lang in languages.into_iter().take(TOP_LANGUAGES) {
            lines.push(format!(
                "  • {}: {} stars ({} repos)",
                lang.language,
                format_count(lang.stars),
                lang.repos
            ));
        }
    }

    render(lines)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
