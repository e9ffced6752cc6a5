//! Turns GitHub pull requests and issues into project tasks.

use serde::{Deserialize, Serialize};

use super::db::{DashboardDb, DbHandle};
use super::github::{GitHubClient, IssueSummary, PullRequestSummary};
use super::models::{NewTask, Priority, TaskStatus};
use crate::errors::DashboardError;

/// A task to create unless one already covers `source_title`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportCandidate {
    pub source_title: String,
    pub task: NewTask,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

pub fn map_pr_status(state: &str) -> TaskStatus {
    match state {
        "open" => TaskStatus::InProgress,
        "closed" => TaskStatus::Done,
        _ => TaskStatus::Todo,
    }
}

pub fn pr_candidate(project_id: i64, pr: &PullRequestSummary) -> ImportCandidate {
    ImportCandidate {
        source_title: pr.title.clone(),
        task: NewTask {
            project_id,
            title: format!("[PR] {}", pr.title),
            description: format!("GitHub PR: {}\nRepo: {}", pr.url, pr.repo),
            status: map_pr_status(&pr.state),
            priority: Priority::Medium,
            labels: pr.labels.clone(),
            assignee: String::new(),
            due_date: None,
            estimated_hours: 0,
        },
    }
}

pub fn issue_candidate(project_id: i64, issue: &IssueSummary) -> ImportCandidate {
    ImportCandidate {
        source_title: issue.title.clone(),
        task: NewTask {
            project_id,
            title: format!("[Issue] {}", issue.title),
            description: format!("{}\n\nGitHub: {}", issue.body, issue.url),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            labels: issue.labels.clone(),
            assignee: issue.assignee.clone(),
            due_date: None,
            estimated_hours: 0,
        },
    }
}

/// Create tasks for candidates not already present in the project.
///
/// A candidate is skipped when any live task title in the project, including
/// ones created earlier in this call, contains its source title. Individual
/// insert failures are counted and logged, never propagated.
pub fn import_candidates(
    db: &DashboardDb,
    project_id: i64,
    candidates: Vec<ImportCandidate>,
) -> Result<ImportSummary, DashboardError> {
    if db.get_project(project_id)?.is_none() {
        return Err(DashboardError::not_found("Project", project_id));
    }

    let mut titles: Vec<String> = db
        .list_tasks(Some(project_id))?
        .into_iter()
        .map(|t| t.title)
        .collect();
    let mut summary = ImportSummary {
        total: candidates.len(),
        ..ImportSummary::default()
    };

    for candidate in candidates {
        if titles.iter().any(|t| t.contains(&candidate.source_title)) {
            summary.skipped += 1;
            continue;
        }
        match db.insert_task(&candidate.task) {
            Ok(task) => {
                titles.push(task.title);
                summary.imported += 1;
            }
            Err(e) => {
                tracing::warn!(project_id, title = %candidate.task.title, error = %e, "failed to import task");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        project_id,
        imported = summary.imported,
        skipped = summary.skipped,
        failed = summary.failed,
        "import finished"
    );
    Ok(summary)
}

async fn ensure_project(db: &DbHandle, project_id: i64) -> Result<(), DashboardError> {
    db.call(move |db| match db.get_project(project_id)? {
        Some(_) => Ok(()),
        None => Err(DashboardError::not_found("Project", project_id)),
    })
    .await
}

pub async fn sync_prs_to_tasks(
    db: &DbHandle,
    github: &GitHubClient,
    token: &str,
    username: &str,
    project_id: i64,
) -> Result<ImportSummary, DashboardError> {
    ensure_project(db, project_id).await?;
    let prs = github.list_user_prs(token, username).await?;
    let candidates: Vec<_> = prs.iter().map(|pr| pr_candidate(project_id, pr)).collect();
    db.call(move |db| import_candidates(db, project_id, candidates))
        .await
}

pub async fn sync_issues_to_tasks(
    db: &DbHandle,
    github: &GitHubClient,
    token: &str,
    owner: &str,
    repo: &str,
    project_id: i64,
) -> Result<ImportSummary, DashboardError> {
    ensure_project(db, project_id).await?;
    let issues = github.list_repo_issues(token, owner, repo).await?;
    let candidates: Vec<_> = issues
        .iter()
        .map(|issue| issue_candidate(project_id, issue))
        .collect();
    db.call(move |db| import_candidates(db, project_id, candidates))
        .await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::dashboard::models::{NewProject, ProjectStatus};
    use crate::errors::ErrorCategory;

    fn db_with_project() -> (DashboardDb, i64) {
        let db = DashboardDb::new_in_memory().unwrap();
        let project = db
            .insert_project(&NewProject {
                name: "imports".into(),
                description: "Imported work".into(),
                repo_url: String::new(),
                status: ProjectStatus::Active,
                color: "#1976d2".into(),
            })
            .unwrap();
        (db, project.id)
    }

    fn pr(title: &str, state: &str) -> PullRequestSummary {
        PullRequestSummary {
            id: 1,
            title: title.into(),
            url: "https://github.com/acme/deck/pull/1".into(),
            state: state.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            repo: "acme/deck".into(),
            labels: "backend, api".into(),
        }
    }

    fn issue(title: &str) -> IssueSummary {
        IssueSummary {
            id: 3,
            title: title.into(),
            body: "It breaks".into(),
            url: "https://github.com/acme/deck/issues/3".into(),
            state: "open".into(),
            created_at: Utc::now(),
            labels: "bug".into(),
            assignee: "octocat".into(),
        }
    }

    #[test]
    fn test_map_pr_status() {
        assert_eq!(map_pr_status("open"), TaskStatus::InProgress);
        assert_eq!(map_pr_status("closed"), TaskStatus::Done);
        assert_eq!(map_pr_status("merged"), TaskStatus::Todo);
    }

    #[test]
    fn test_candidate_shapes() {
        let c = pr_candidate(9, &pr("Add cache", "closed"));
        assert_eq!(c.source_title, "Add cache");
        assert_eq!(c.task.title, "[PR] Add cache");
        assert_eq!(
            c.task.description,
            "GitHub PR: https://github.com/acme/deck/pull/1\nRepo: acme/deck"
        );
        assert_eq!(c.task.status, TaskStatus::Done);
        assert_eq!(c.task.priority, Priority::Medium);
        assert_eq!(c.task.labels, "backend, api");

        let c = issue_candidate(9, &issue("Crash on start"));
        assert_eq!(c.task.title, "[Issue] Crash on start");
        assert_eq!(
            c.task.description,
            "It breaks\n\nGitHub: https://github.com/acme/deck/issues/3"
        );
        assert_eq!(c.task.status, TaskStatus::Todo);
        assert_eq!(c.task.assignee, "octocat");
    }

    #[test]
    fn test_import_skips_existing_by_substring() {
        let (db, pid) = db_with_project();
        let first = import_candidates(&db, pid, vec![pr_candidate(pid, &pr("Add cache", "open"))])
            .unwrap();
        assert_eq!(first.imported, 1);

        let again = import_candidates(
            &db,
            pid,
            vec![
                pr_candidate(pid, &pr("Add cache", "open")),
                issue_candidate(pid, &issue("cache")),
                issue_candidate(pid, &issue("Totally new")),
            ],
        )
        .unwrap();
        assert_eq!(
            again,
            ImportSummary {
                imported: 1,
                skipped: 2,
                failed: 0,
                total: 3
            }
        );
        assert_eq!(db.list_tasks(Some(pid)).unwrap().len(), 2);
    }

    #[test]
    fn test_import_dedups_within_one_run() {
        let (db, pid) = db_with_project();
        let summary = import_candidates(
            &db,
            pid,
            vec![
                issue_candidate(pid, &issue("Flaky test")),
                issue_candidate(pid, &issue("Flaky test")),
            ],
        )
        .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_import_counts_failures_and_continues() {
        let (db, pid) = db_with_project();
        let mut broken = issue_candidate(pid, &issue("Points elsewhere"));
        broken.task.project_id = 9_999;
        let summary = import_candidates(
            &db,
            pid,
            vec![broken, issue_candidate(pid, &issue("Still imported"))],
        )
        .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn test_import_into_missing_project_is_not_found() {
        let db = DashboardDb::new_in_memory().unwrap();
        let err = import_candidates(&db, 5, vec![]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn test_sync_issues_end_to_end() {
        let (db, pid) = db_with_project();
        let db = DbHandle::new(db);
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/deck/issues")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"number":3,"title":"Crash on start","body":null,
                     "html_url":"https://github.com/acme/deck/issues/3","state":"open",
                     "created_at":"2024-04-01T08:30:00Z","updated_at":"2024-04-01T08:30:00Z",
                     "labels":[],"assignee":null}]"#,
            )
            .create_async()
            .await;
        let gh = GitHubClient::new(&server.url()).unwrap();

        let summary = sync_issues_to_tasks(&db, &gh, "tok", "acme", "deck", pid)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);

        let missing = sync_issues_to_tasks(&db, &gh, "tok", "acme", "deck", pid + 1)
            .await
            .unwrap_err();
        assert_eq!(missing.category(), ErrorCategory::NotFound);
    }
}
