//! Latest-commit lookup for add-on templates hosted on GitHub.
//!
//! An add-on's repository is a base project plus the change that adds the
//! feature, so its most recent commit diff shows what to apply. Lookups are
//! best-effort: callers log failures and leave the field out.
//!
//! Two REST calls per lookup:
//!
//! 1. `GET {api_url}/repos/{owner}/{repo}/commits?per_page=1`
//! 2. `GET {api_url}/repos/{owner}/{repo}/commits/{sha}` with
//!    `Accept: application/vnd.github.v3.diff`
//!
//! `GITHUB_TOKEN`, when set, is sent as a bearer token to lift the
//! anonymous rate limit.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::GithubConfig;

/// Diffs longer than this many characters are cut and marked.
pub const DIFF_LIMIT: usize = 4000;

const TRUNCATION_MARKER: &str = "\n... (truncated, see full diff on GitHub)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestChange {
    pub message: String,
    pub author: String,
    pub date: String,
    pub diff: String,
}

pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("template-search/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header(reqwest::header::ACCEPT, accept);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Most recent commit of `slug` (`owner/repo`) with its diff.
    pub async fn latest_change(&self, slug: &str) -> Result<LatestChange> {
        let commits_url = format!("{}/repos/{}/commits?per_page=1", self.api_url, slug);
        let response = self
            .get(&commits_url, "application/vnd.github.v3+json")
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", commits_url))?;
        if !response.status().is_success() {
            bail!("GitHub API error {} for {}", response.status(), commits_url);
        }
        let commits: Value = response.json().await?;
        let latest = commits
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("repository {} has no commits", slug))?;

        let sha = latest["sha"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid GitHub response: missing sha"))?;
        let commit = &latest["commit"];

        let diff_url = format!("{}/repos/{}/commits/{}", self.api_url, slug, sha);
        let response = self
            .get(&diff_url, "application/vnd.github.v3.diff")
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", diff_url))?;
        if !response.status().is_success() {
            bail!("GitHub API error {} for {}", response.status(), diff_url);
        }
        let diff = response.text().await?;

        Ok(LatestChange {
            message: commit["message"].as_str().unwrap_or_default().to_string(),
            author: commit["author"]["name"].as_str().unwrap_or_default().to_string(),
            date: commit["author"]["date"].as_str().unwrap_or_default().to_string(),
            diff: truncate_diff(&diff, DIFF_LIMIT),
        })
    }
}

/// `owner/repo` for a `https://github.com/<owner>/<repo>` URL.
pub fn repo_slug(github_url: &str) -> Option<String> {
    let slug = github_url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .strip_prefix("https://github.com/")?;
    let mut parts = slug.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some(format!("{}/{}", owner, repo))
        }
        _ => None,
    }
}

fn truncate_diff(diff: &str, limit: usize) -> String {
    match diff.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &diff[..cut], TRUNCATION_MARKER),
        None => diff.to_string(),
    }
}
