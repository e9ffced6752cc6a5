//! GitOps applications: stored definitions and the clone-and-apply sync.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::Arc;

use chrono::Utc;

use super::command::CommandRunner;
use super::db::{DashboardDb, DbHandle, Table};
use super::models::{GitOpsApp, GitOpsAppCreateInput, NewGitOpsApp};
use crate::errors::DashboardError;

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_NAMESPACE: &str = "default";

// ── App CRUD ─────────────────────────────────────────────────────────

fn reject_option_like(field: &str, value: &str) -> Result<(), DashboardError> {
    if value.starts_with('-') || value.chars().any(char::is_whitespace) {
        return Err(DashboardError::validation(format!("invalid {} '{}'", field, value)));
    }
    Ok(())
}

/// Manifest paths must stay inside the cloned repository.
fn check_manifest_path(path: &str) -> Result<(), DashboardError> {
    let p = Path::new(path);
    if p.is_absolute() || path.starts_with('/') {
        return Err(DashboardError::validation("path must be relative to the repository root"));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(DashboardError::validation("path must not contain '..'"));
    }
    Ok(())
}

pub fn create_app(db: &DashboardDb, input: GitOpsAppCreateInput) -> Result<GitOpsApp, DashboardError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(DashboardError::validation("name is required"));
    }
    let repo_url = input.repo_url.trim();
    if repo_url.is_empty() {
        return Err(DashboardError::validation("repo_url is required"));
    }
    reject_option_like("repo_url", repo_url)?;

    let branch = non_blank(&input.branch).unwrap_or(DEFAULT_BRANCH);
    reject_option_like("branch", branch)?;
    let namespace = non_blank(&input.namespace).unwrap_or(DEFAULT_NAMESPACE);
    reject_option_like("namespace", namespace)?;
    let path = non_blank(&input.path).unwrap_or_default();
    check_manifest_path(path)?;

    Ok(db.insert_gitops_app(&NewGitOpsApp {
        name: name.to_string(),
        repo_url: repo_url.to_string(),
        branch: branch.to_string(),
        path: path.to_string(),
        namespace: namespace.to_string(),
    })?)
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn list_apps(db: &DashboardDb) -> Result<Vec<GitOpsApp>, DashboardError> {
    Ok(db.list_gitops_apps()?)
}

pub fn get_app(db: &DashboardDb, id: i64) -> Result<GitOpsApp, DashboardError> {
    db.get_gitops_app(id)?
        .ok_or_else(|| DashboardError::not_found("GitOps app", id))
}

pub fn delete_app(db: &DashboardDb, id: i64) -> Result<(), DashboardError> {
    if db.soft_delete(Table::GitOpsApps, id)? {
        Ok(())
    } else {
        Err(DashboardError::not_found("GitOps app", id))
    }
}

// ── Sync ─────────────────────────────────────────────────────────────

/// Clones an app's repository and applies its manifests with kubectl.
pub struct GitOpsSyncer {
    runner: Arc<dyn CommandRunner>,
    git: String,
    kubectl: String,
    locks: std::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitOpsSyncer {
    pub fn new(runner: Arc<dyn CommandRunner>, git: impl Into<String>, kubectl: impl Into<String>) -> Self {
        Self {
            runner,
            git: git.into(),
            kubectl: kubectl.into(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn app_lock(&self, id: i64) -> Result<Arc<tokio::sync::Mutex<()>>, DashboardError> {
        let mut locks = self.locks.lock().map_err(|_| DashboardError::LockPoisoned)?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Forget the lock for `id` once no sync holds or waits on it.
    fn release_lock(&self, id: i64, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            tracing::warn!(app_id = id, "gitops lock map poisoned; keeping entry");
            return;
        };
        drop(lock);
        if locks.get(&id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    /// Sync one app. Concurrent calls for the same id run one at a time.
    ///
    /// On failure the app is marked `OutOfSync` (leaving `last_synced` as it
    /// was) and the command error is returned; on success it is marked
    /// `Synced` at the current time and the updated app is returned.
    pub async fn sync_app(&self, db: &DbHandle, id: i64) -> Result<GitOpsApp, DashboardError> {
        let lock = self.app_lock(id)?;
        let outcome = {
            let _guard = lock.lock().await;
            self.sync_locked(db, id).await
        };
        self.release_lock(id, lock);
        outcome
    }

    async fn sync_locked(&self, db: &DbHandle, id: i64) -> Result<GitOpsApp, DashboardError> {
        let app = db.call(move |db| get_app(db, id)).await?;
        tracing::info!(app_id = id, repo_url = %app.repo_url, branch = %app.branch, "starting gitops sync");

        let scratch = tempfile::Builder::new().prefix("gitops-").tempdir()?;
        let outcome = self.clone_and_apply(&app, scratch.path()).await;
        drop(scratch);

        match outcome {
            Ok(()) => {
                let at = Utc::now();
                let synced = db
                    .call(move |db| Ok(db.mark_gitops_synced(id, at)?))
                    .await?;
                tracing::info!(app_id = id, "gitops sync succeeded");
                Ok(synced)
            }
            Err(e) => {
                tracing::warn!(app_id = id, error = %e, "gitops sync failed");
                if let Err(mark_err) = db
                    .call(move |db| Ok(db.mark_gitops_out_of_sync(id)?))
                    .await
                {
                    tracing::error!(app_id = id, error = %mark_err, "failed to record sync failure");
                }
                Err(e)
            }
        }
    }

    async fn clone_and_apply(&self, app: &GitOpsApp, scratch: &Path) -> Result<(), DashboardError> {
        let checkout = scratch.to_string_lossy().into_owned();
        let clone_args = vec![
            "clone".to_string(),
            "--branch".to_string(),
            app.branch.clone(),
            "--depth".to_string(),
            "1".to_string(),
            "--".to_string(),
            app.repo_url.clone(),
            checkout,
        ];
        self.runner
            .run(&self.git, &clone_args)
            .await?
            .into_result(&self.git, &clone_args)?;

        let manifests = scratch.join(&app.path).to_string_lossy().into_owned();
        let apply_args = vec![
            "apply".to_string(),
            "-f".to_string(),
            manifests,
            "-n".to_string(),
            app.namespace.clone(),
        ];
        self.runner
            .run(&self.kubectl, &apply_args)
            .await?
            .into_result(&self.kubectl, &apply_args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::dashboard::command::mock::{ScriptedRunner, fail, ok};
    use crate::dashboard::models::SyncStatus;
    use crate::errors::ErrorCategory;

    fn input(name: &str) -> GitOpsAppCreateInput {
        GitOpsAppCreateInput {
            name: name.into(),
            repo_url: "https://github.com/acme/manifests.git".into(),
            path: Some("k8s/prod".into()),
            ..GitOpsAppCreateInput::default()
        }
    }

    fn handle_with_app() -> (DbHandle, GitOpsApp) {
        let db = DashboardDb::new_in_memory().unwrap();
        let app = create_app(&db, input("guestbook")).unwrap();
        (DbHandle::new(db), app)
    }

    fn load(db: &DbHandle, id: i64) -> GitOpsApp {
        db.lock_sync().unwrap().get_gitops_app(id).unwrap().unwrap()
    }

    #[test]
    fn test_create_app_defaults() {
        let db = DashboardDb::new_in_memory().unwrap();
        let app = create_app(
            &db,
            GitOpsAppCreateInput {
                name: " guestbook ".into(),
                repo_url: "https://github.com/acme/manifests.git".into(),
                ..GitOpsAppCreateInput::default()
            },
        )
        .unwrap();
        assert_eq!(app.name, "guestbook");
        assert_eq!(app.branch, "main");
        assert_eq!(app.namespace, "default");
        assert_eq!(app.path, "");
        assert_eq!(app.sync_status, SyncStatus::Unknown);
        assert!(app.last_synced.is_none());
    }

    #[test]
    fn test_create_app_validation() {
        let db = DashboardDb::new_in_memory().unwrap();
        assert!(create_app(&db, GitOpsAppCreateInput::default()).is_err());

        let mut absolute = input("abs");
        absolute.path = Some("/etc".into());
        assert!(create_app(&db, absolute).is_err());

        let mut escaping = input("escape");
        escaping.path = Some("k8s/../../secrets".into());
        assert!(create_app(&db, escaping).is_err());

        let mut sneaky = input("sneaky");
        sneaky.repo_url = "--upload-pack=evil".into();
        assert!(create_app(&db, sneaky).is_err());

        let mut bad_branch = input("branchy");
        bad_branch.branch = Some("-b".into());
        assert!(create_app(&db, bad_branch).is_err());
    }

    #[test]
    fn test_get_and_delete_app() {
        let db = DashboardDb::new_in_memory().unwrap();
        let app = create_app(&db, input("short-lived")).unwrap();
        assert_eq!(get_app(&db, app.id).unwrap(), app);
        assert_eq!(list_apps(&db).unwrap().len(), 1);
        delete_app(&db, app.id).unwrap();
        assert_eq!(get_app(&db, app.id).unwrap_err().category(), ErrorCategory::NotFound);
        assert_eq!(delete_app(&db, app.id).unwrap_err().category(), ErrorCategory::NotFound);
        assert!(list_apps(&db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_success_marks_synced() {
        let (db, app) = handle_with_app();
        let runner = Arc::new(ScriptedRunner::new(|_, _| ok("")));
        let syncer = GitOpsSyncer::new(runner.clone(), "git", "kubectl");

        let started = Utc::now();
        let synced = syncer.sync_app(&db, app.id).await.unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert!(synced.last_synced.unwrap() >= started);
        assert_eq!(load(&db, app.id), synced);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        let (git, clone_args) = &calls[0];
        assert_eq!(git, "git");
        assert_eq!(&clone_args[..6], &["clone", "--branch", "main", "--depth", "1", "--"]);
        assert_eq!(clone_args[6], "https://github.com/acme/manifests.git");
        let checkout = clone_args[7].clone();
        assert!(
            Path::new(&checkout)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("gitops-")
        );

        let (kubectl, apply_args) = &calls[1];
        assert_eq!(kubectl, "kubectl");
        assert_eq!(apply_args[0], "apply");
        assert_eq!(apply_args[2], Path::new(&checkout).join("k8s/prod").to_string_lossy());
        assert_eq!(&apply_args[3..], &["-n", "default"]);

        // Scratch directory is gone once the sync returns.
        assert!(!Path::new(&checkout).exists());
    }

    #[tokio::test]
    async fn test_clone_failure_marks_out_of_sync() {
        let (db, app) = handle_with_app();
        let runner = Arc::new(ScriptedRunner::new(|program, _| match program {
            "git" => fail("fatal: repository not found"),
            _ => panic!("kubectl must not run after a failed clone"),
        }));
        let syncer = GitOpsSyncer::new(runner, "git", "kubectl");

        let err = syncer.sync_app(&db, app.id).await.unwrap_err();
        assert!(matches!(err, DashboardError::Command { .. }));
        assert!(err.to_string().contains("repository not found"));

        let stored = load(&db, app.id);
        assert_eq!(stored.sync_status, SyncStatus::OutOfSync);
        assert!(stored.last_synced.is_none());
    }

    #[tokio::test]
    async fn test_apply_failure_keeps_previous_last_synced() {
        let (db, app) = handle_with_app();
        let ok_syncer = GitOpsSyncer::new(Arc::new(ScriptedRunner::new(|_, _| ok(""))), "git", "kubectl");
        let first = ok_syncer.sync_app(&db, app.id).await.unwrap();

        let runner = Arc::new(ScriptedRunner::new(|program, _| match program {
            "git" => ok(""),
            _ => fail("error: no objects passed to apply"),
        }));
        let syncer = GitOpsSyncer::new(runner, "git", "kubectl");
        let err = syncer.sync_app(&db, app.id).await.unwrap_err();
        assert!(err.to_string().contains("kubectl apply failed"));

        let stored = load(&db, app.id);
        assert_eq!(stored.sync_status, SyncStatus::OutOfSync);
        assert_eq!(stored.last_synced, first.last_synced);
    }

    #[tokio::test]
    async fn test_sync_missing_app_is_not_found() {
        let (db, _) = handle_with_app();
        let runner = Arc::new(ScriptedRunner::new(|_, _| ok("")));
        let syncer = GitOpsSyncer::new(runner.clone(), "git", "kubectl");
        let err = syncer.sync_app(&db, 404).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_syncs_of_one_app_are_serialized() {
        let (db, app) = handle_with_app();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());
        let runner = Arc::new(ScriptedRunner::new(move |program, _| {
            if program == "git" {
                let now = in_flight_c.fetch_add(1, Ordering::SeqCst) + 1;
                peak_c.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
            } else {
                in_flight_c.fetch_sub(1, Ordering::SeqCst);
            }
            ok("")
        }));
        let syncer = Arc::new(GitOpsSyncer::new(runner, "git", "kubectl"));

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let syncer = syncer.clone();
                let db = db.clone();
                tokio::spawn(async move { syncer.sync_app(&db, app.id).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(syncer.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_finished_syncs_leave_no_lock_behind() {
        let (db, app) = handle_with_app();
        let runner = Arc::new(ScriptedRunner::new(|program, _| match program {
            "kubectl" => fail("apply rejected"),
            _ => ok(""),
        }));
        let syncer = GitOpsSyncer::new(runner, "git", "kubectl");

        assert!(syncer.sync_app(&db, app.id).await.is_err());
        assert!(syncer.sync_app(&db, 9999).await.is_err());
        assert_eq!(syncer.tracked_locks(), 0);

        let syncer = GitOpsSyncer::new(Arc::new(ScriptedRunner::new(|_, _| ok(""))), "git", "kubectl");
        syncer.sync_app(&db, app.id).await.unwrap();
        assert_eq!(syncer.tracked_locks(), 0);
    }
}
