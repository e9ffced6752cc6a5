use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::DashboardError;

const USER_AGENT: &str = "clouddeck";
const PAGE_SIZE: &str = "50";

/// Thin client over the GitHub REST API. Tokens are supplied per call and
/// never retained.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `{base}/{path}` with bearer auth and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DashboardError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to GitHub: {}", path))
            .map_err(DashboardError::GitHub)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DashboardError::GitHub(anyhow::anyhow!(
                "GitHub returned {} for {}: {}",
                status,
                path,
                body.trim()
            )));
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse GitHub response for {}", path))
            .map_err(DashboardError::GitHub)
    }

    /// Pull requests authored by `username`, most relevant first.
    pub async fn list_user_prs(
        &self,
        token: &str,
        username: &str,
    ) -> Result<Vec<PullRequestSummary>, DashboardError> {
        let query = format!("author:{} is:pr", username.trim());
        let result: SearchResponse = self
            .get_json(token, "search/issues", &[("q", query.as_str()), ("per_page", PAGE_SIZE)])
            .await?;
        Ok(result
            .items
            .into_iter()
            .filter(|i| i.pull_request.is_some())
            .map(PullRequestSummary::from)
            .collect())
    }

    /// Open issues of `owner/repo`, excluding pull requests.
    pub async fn list_repo_issues(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<IssueSummary>, DashboardError> {
        let path = repo_path(owner, repo, "issues")?;
        let issues: Vec<ApiIssue> = self
            .get_json(token, &path, &[("state", "open"), ("per_page", PAGE_SIZE)])
            .await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(IssueSummary::from)
            .collect())
    }
}

/// `repos/{owner}/{repo}/{suffix}`, rejecting segments that would alter the path.
pub(crate) fn repo_path(owner: &str, repo: &str, suffix: &str) -> Result<String, DashboardError> {
    for (field, value) in [("owner", owner), ("repo", repo)] {
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(DashboardError::validation(format!(
                "invalid {} '{}'",
                field, value
            )));
        }
    }
    Ok(format!("repos/{}/{}/{}", owner, repo, suffix))
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<ApiIssue>,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

/// Issue or pull request as returned by the issues and search endpoints.
#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: i64,
    title: String,
    body: Option<String>,
    html_url: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    assignee: Option<ApiUser>,
    pull_request: Option<serde_json::Value>,
}

// ── Projections ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestSummary {
    /// The PR number within its repository.
    pub id: i64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `owner/name`
    pub repo: String,
    pub labels: String,
}

impl From<ApiIssue> for PullRequestSummary {
    fn from(issue: ApiIssue) -> Self {
        Self {
            id: issue.number,
            repo: extract_repo(&issue.html_url),
            labels: join_labels(&issue.labels),
            title: issue.title,
            url: issue.html_url,
            state: issue.state,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueSummary {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub labels: String,
    pub assignee: String,
}

impl From<ApiIssue> for IssueSummary {
    fn from(issue: ApiIssue) -> Self {
        Self {
            id: issue.number,
            labels: join_labels(&issue.labels),
            assignee: issue.assignee.map(|u| u.login).unwrap_or_default(),
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            url: issue.html_url,
            state: issue.state,
            created_at: issue.created_at,
        }
    }
}

/// `https://github.com/owner/name/pull/1` -> `owner/name`; empty if too short.
pub fn extract_repo(html_url: &str) -> String {
    let parts: Vec<&str> = html_url.split('/').collect();
    if parts.len() >= 5 {
        format!("{}/{}", parts[3], parts[4])
    } else {
        String::new()
    }
}

fn join_labels(labels: &[ApiLabel]) -> String {
    labels
        .iter()
        .map(|l| l.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
