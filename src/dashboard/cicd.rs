//! Workflow run history and pipeline statistics from GitHub Actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::github::{GitHubClient, repo_path};
use crate::errors::DashboardError;

pub const DEFAULT_RUN_LIMIT: u32 = 20;
const MAX_RUN_LIMIT: u32 = 100;
const SHA_LEN: usize = 7;
const COMMIT_MESSAGE_LEN: usize = 50;

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    workflow_runs: Vec<ApiWorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ApiHeadCommit {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiWorkflowRun {
    id: i64,
    name: Option<String>,
    status: Option<String>,
    conclusion: Option<String>,
    head_branch: Option<String>,
    #[serde(default)]
    event: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    head_sha: String,
    head_commit: Option<ApiHeadCommit>,
    #[serde(default)]
    run_number: i64,
    run_attempt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WorkflowsResponse {
    #[serde(default)]
    workflows: Vec<ApiWorkflow>,
}

#[derive(Debug, Deserialize)]
struct ApiWorkflow {
    id: i64,
    name: String,
    path: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    badge_url: String,
}

// ── Projections ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRunSummary {
    pub id: i64,
    pub name: String,
    pub status: String,
    /// Empty while the run is still in progress.
    pub conclusion: String,
    pub branch: String,
    pub event: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub head_sha: String,
    pub head_commit: String,
    pub run_number: i64,
    pub attempt: i64,
}

impl From<ApiWorkflowRun> for WorkflowRunSummary {
    fn from(run: ApiWorkflowRun) -> Self {
        Self {
            id: run.id,
            name: run.name.unwrap_or_default(),
            status: run.status.unwrap_or_default(),
            conclusion: run.conclusion.unwrap_or_default(),
            branch: run.head_branch.unwrap_or_default(),
            event: run.event,
            created_at: run.created_at,
            updated_at: run.updated_at,
            url: run.html_url,
            head_sha: run.head_sha.chars().take(SHA_LEN).collect(),
            head_commit: run
                .head_commit
                .map(|c| truncate_message(&c.message))
                .unwrap_or_default(),
            run_number: run.run_number,
            attempt: run.run_attempt.unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSummary {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub badge_url: String,
}

impl From<ApiWorkflow> for WorkflowSummary {
    fn from(w: ApiWorkflow) -> Self {
        Self {
            id: w.id,
            name: w.name,
            path: w.path,
            state: w.state,
            created_at: w.created_at,
            updated_at: w.updated_at,
            url: w.html_url,
            badge_url: w.badge_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStats {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub success_rate: f64,
    /// `"<m>m <s>s"`; `None` when there are no runs.
    pub avg_duration: Option<String>,
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() > COMMIT_MESSAGE_LEN {
        let head: String = message.chars().take(COMMIT_MESSAGE_LEN).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

/// Success/failure tallies and mean wall-clock duration over `runs`.
pub fn compute_pipeline_stats(runs: &[WorkflowRunSummary]) -> PipelineStats {
    let total_runs = runs.len();
    let successful_runs = runs.iter().filter(|r| r.conclusion == "success").count();
    let failed_runs = runs.iter().filter(|r| r.conclusion == "failure").count();

    if total_runs == 0 {
        return PipelineStats {
            total_runs,
            successful_runs,
            failed_runs,
            success_rate: 0.0,
            avg_duration: None,
        };
    }

    let total_ms: i64 = runs
        .iter()
        .map(|r| (r.updated_at - r.created_at).num_milliseconds())
        .sum();
    let avg_secs = total_ms / total_runs as i64 / 1000;

    PipelineStats {
        total_runs,
        successful_runs,
        failed_runs,
        success_rate: successful_runs as f64 / total_runs as f64 * 100.0,
        avg_duration: Some(format!("{}m {}s", avg_secs / 60, avg_secs % 60)),
    }
}

// ── Operations ───────────────────────────────────────────────────────

/// Most recent runs of every workflow in the repository. `limit` is clamped
/// to 1..=100.
pub async fn list_workflow_runs(
    github: &GitHubClient,
    token: &str,
    owner: &str,
    repo: &str,
    limit: u32,
) -> Result<Vec<WorkflowRunSummary>, DashboardError> {
    let path = repo_path(owner, repo, "actions/runs")?;
    let per_page = limit.clamp(1, MAX_RUN_LIMIT).to_string();
    let resp: RunsResponse = github
        .get_json(token, &path, &[("per_page", per_page.as_str())])
        .await?;
    Ok(resp
        .workflow_runs
        .into_iter()
        .map(WorkflowRunSummary::from)
        .collect())
}

pub async fn pipeline_stats(
    github: &GitHubClient,
    token: &str,
    owner: &str,
    repo: &str,
) -> Result<PipelineStats, DashboardError> {
    let runs = list_workflow_runs(github, token, owner, repo, MAX_RUN_LIMIT).await?;
    Ok(compute_pipeline_stats(&runs))
}

pub async fn list_workflows(
    github: &GitHubClient,
    token: &str,
    owner: &str,
    repo: &str,
) -> Result<Vec<WorkflowSummary>, DashboardError> {
    let path = repo_path(owner, repo, "actions/workflows")?;
    let resp: WorkflowsResponse = github.get_json(token, &path, &[]).await?;
    Ok(resp
        .workflows
        .into_iter()
        .map(WorkflowSummary::from)
        .collect())
}
