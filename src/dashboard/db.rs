use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;
use crate::errors::DashboardError;

/// Async-safe handle to the dashboard database.
///
/// Wraps `DashboardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DashboardDb>>,
}

impl DbHandle {
    pub fn new(db: DashboardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, DashboardError>
    where
        F: FnOnce(&DashboardDb) -> Result<R, DashboardError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| DashboardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| DashboardError::Database(anyhow::anyhow!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously.
    #[cfg(test)]
    pub(crate) fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, DashboardDb>, DashboardError> {
        self.inner.lock().map_err(|_| DashboardError::LockPoisoned)
    }
}

/// Tables carrying a soft-delete marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Items,
    Projects,
    Tasks,
    Containers,
    GitOpsApps,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Projects => "projects",
            Self::Tasks => "tasks",
            Self::Containers => "containers",
            Self::GitOpsApps => "gitops_apps",
        }
    }
}

/// Render a timestamp the way every `*_at` column stores it.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp '{}'", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

pub struct DashboardDb {
    conn: Connection,
}

impl DashboardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    repo_url TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'active',
                    color TEXT NOT NULL DEFAULT '#1976d2',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id),
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'todo',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    labels TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS containers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    container_id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL DEFAULT '',
                    image TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT '',
                    state TEXT NOT NULL DEFAULT '',
                    cpu_percent REAL NOT NULL DEFAULT 0,
                    memory_usage INTEGER NOT NULL DEFAULT 0,
                    memory_limit INTEGER NOT NULL DEFAULT 0,
                    network_rx INTEGER NOT NULL DEFAULT 0,
                    network_tx INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS gitops_apps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    repo_url TEXT NOT NULL,
                    branch TEXT NOT NULL DEFAULT 'main',
                    path TEXT NOT NULL DEFAULT '',
                    namespace TEXT NOT NULL DEFAULT 'default',
                    sync_status TEXT NOT NULL DEFAULT 'Unknown',
                    last_synced TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_items_live_name
                    ON items(name) WHERE deleted_at IS NULL;
                CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_live_name
                    ON projects(name) WHERE deleted_at IS NULL;
                CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
                CREATE INDEX IF NOT EXISTS idx_items_deleted ON items(deleted_at);
                CREATE INDEX IF NOT EXISTS idx_projects_deleted ON projects(deleted_at);
                CREATE INDEX IF NOT EXISTS idx_tasks_deleted ON tasks(deleted_at);
                CREATE INDEX IF NOT EXISTS idx_containers_deleted ON containers(deleted_at);
                CREATE INDEX IF NOT EXISTS idx_gitops_apps_deleted ON gitops_apps(deleted_at);
                ",
            )
            .context("Failed to create tables")?;

        // Additive migrations for task planning fields.
        self.add_column_if_missing("tasks", "assignee TEXT NOT NULL DEFAULT ''")?;
        self.add_column_if_missing("tasks", "due_date TEXT")?;
        self.add_column_if_missing("tasks", "estimated_hours INTEGER NOT NULL DEFAULT 0")?;

        Ok(())
    }

    /// Only "duplicate column" errors are ignored; anything else propagates.
    fn add_column_if_missing(&self, table: &str, column_ddl: &str) -> Result<()> {
        let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, column_ddl);
        match self.conn.execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate column") => Ok(()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to add column '{}' to {}: {}",
                column_ddl,
                table,
                e
            )),
        }
    }

    fn query_all<P, R, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<R>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<R>,
    {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let rows = stmt.query_map(params, map).context("Failed to run query")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read row")?);
        }
        Ok(out)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<i64> {
        self.conn
            .query_row(sql, params, |row| row.get(0))
            .with_context(|| format!("Failed to count: {}", sql))
    }

    // ── Shared soft-delete helpers ────────────────────────────────────

    /// Set the delete marker on a live row. Returns false if no live row had
    /// that id.
    pub fn soft_delete(&self, table: Table, id: i64) -> Result<bool> {
        let now = format_ts(&Utc::now());
        let sql = format!(
            "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            table.as_str()
        );
        let count = self
            .conn
            .execute(&sql, params![now, id])
            .with_context(|| format!("Failed to soft-delete from {}", table.as_str()))?;
        Ok(count > 0)
    }

    /// Whether a live row other than `exclude_id` already holds `name`.
    pub fn name_taken(&self, table: Table, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE name = ?1 AND deleted_at IS NULL AND id != ?2",
            table.as_str()
        );
        Ok(self.count(&sql, params![name, exclude_id.unwrap_or(-1)])? > 0)
    }

    // ── Item CRUD ─────────────────────────────────────────────────────

    pub fn insert_item(&self, name: &str, description: &str) -> Result<Item> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO items (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![name, description, now],
            )
            .context("Failed to insert item")?;
        let id = self.conn.last_insert_rowid();
        self.get_item(id)?.context("Item not found after insert")
    }

    pub fn list_items(&self) -> Result<Vec<Item>> {
        self.query_all(
            "SELECT id, name, description, created_at, updated_at FROM items
             WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC",
            [],
            ItemRow::from_row,
        )?
        .into_iter()
        .map(ItemRow::into_item)
        .collect()
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at FROM items
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                ItemRow::from_row,
            )
            .optional()
            .context("Failed to query item")?
            .map(ItemRow::into_item)
            .transpose()
    }

    pub fn update_item(&self, item: &Item) -> Result<Item> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE items SET name = ?1, description = ?2, updated_at = ?3
                 WHERE id = ?4 AND deleted_at IS NULL",
                params![item.name, item.description, now, item.id],
            )
            .context("Failed to update item")?;
        self.get_item(item.id)?.context("Item not found after update")
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn insert_project(&self, project: &NewProject) -> Result<Project> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO projects (name, description, repo_url, status, color, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    project.name,
                    project.description,
                    project.repo_url,
                    project.status.as_str(),
                    project.color,
                    now
                ],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.query_all(
            "SELECT id, name, description, repo_url, status, color, created_at, updated_at
             FROM projects WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC",
            [],
            ProjectRow::from_row,
        )?
        .into_iter()
        .map(ProjectRow::into_project)
        .collect()
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, description, repo_url, status, color, created_at, updated_at
                 FROM projects WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                ProjectRow::from_row,
            )
            .optional()
            .context("Failed to query project")?
            .map(ProjectRow::into_project)
            .transpose()
    }

    pub fn update_project(&self, project: &Project) -> Result<Project> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE projects SET name = ?1, description = ?2, repo_url = ?3, status = ?4,
                 color = ?5, updated_at = ?6 WHERE id = ?7 AND deleted_at IS NULL",
                params![
                    project.name,
                    project.description,
                    project.repo_url,
                    project.status.as_str(),
                    project.color,
                    now,
                    project.id
                ],
            )
            .context("Failed to update project")?;
        self.get_project(project.id)?
            .context("Project not found after update")
    }

    pub fn count_projects(&self, status: Option<ProjectStatus>) -> Result<i64> {
        match status {
            Some(s) => self.count(
                "SELECT COUNT(*) FROM projects WHERE deleted_at IS NULL AND status = ?1",
                params![s.as_str()],
            ),
            None => self.count("SELECT COUNT(*) FROM projects WHERE deleted_at IS NULL", []),
        }
    }

    pub fn task_counts_per_project(&self) -> Result<Vec<ProjectTaskCount>> {
        self.query_all(
            "SELECT p.id, p.name, COUNT(t.id)
             FROM projects p
             LEFT JOIN tasks t ON t.project_id = p.id AND t.deleted_at IS NULL
             WHERE p.deleted_at IS NULL
             GROUP BY p.id, p.name
             ORDER BY p.id",
            [],
            |row| {
                Ok(ProjectTaskCount {
                    project_id: row.get(0)?,
                    name: row.get(1)?,
                    task_count: row.get(2)?,
                })
            },
        )
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    pub fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO tasks (project_id, title, description, status, priority, labels,
                 assignee, due_date, estimated_hours, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    task.project_id,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.labels,
                    task.assignee,
                    task.due_date.as_ref().map(format_ts),
                    task.estimated_hours,
                    now
                ],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.context("Task not found after insert")
    }

    /// Live tasks, newest first, optionally restricted to one project.
    pub fn list_tasks(&self, project_id: Option<i64>) -> Result<Vec<Task>> {
        let rows = match project_id {
            Some(pid) => self.query_all(
                "SELECT id, project_id, title, description, status, priority, labels, assignee,
                 due_date, estimated_hours, created_at, updated_at
                 FROM tasks WHERE deleted_at IS NULL AND project_id = ?1
                 ORDER BY created_at DESC, id DESC",
                params![pid],
                TaskRow::from_row,
            )?,
            None => self.query_all(
                "SELECT id, project_id, title, description, status, priority, labels, assignee,
                 due_date, estimated_hours, created_at, updated_at
                 FROM tasks WHERE deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC",
                [],
                TaskRow::from_row,
            )?,
        };
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.conn
            .query_row(
                "SELECT id, project_id, title, description, status, priority, labels, assignee,
                 due_date, estimated_hours, created_at, updated_at
                 FROM tasks WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                TaskRow::from_row,
            )
            .optional()
            .context("Failed to query task")?
            .map(TaskRow::into_task)
            .transpose()
    }

    pub fn update_task(&self, task: &Task) -> Result<Task> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4,
                 labels = ?5, assignee = ?6, due_date = ?7, estimated_hours = ?8, updated_at = ?9
                 WHERE id = ?10 AND deleted_at IS NULL",
                params![
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.labels,
                    task.assignee,
                    task.due_date.as_ref().map(format_ts),
                    task.estimated_hours,
                    now,
                    task.id
                ],
            )
            .context("Failed to update task")?;
        self.get_task(task.id)?.context("Task not found after update")
    }

    pub fn count_tasks(&self, status: Option<TaskStatus>) -> Result<i64> {
        match status {
            Some(s) => self.count(
                "SELECT COUNT(*) FROM tasks WHERE deleted_at IS NULL AND status = ?1",
                params![s.as_str()],
            ),
            None => self.count("SELECT COUNT(*) FROM tasks WHERE deleted_at IS NULL", []),
        }
    }

    // ── Container cache ───────────────────────────────────────────────

    /// Replace the live cache with `snapshot`: rows for containers that are
    /// no longer reported get their delete marker, present ones are upserted
    /// (and revived if previously marked).
    pub fn replace_container_cache(&self, snapshot: &[ContainerSnapshot]) -> Result<()> {
        let now = format_ts(&Utc::now());
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        tx.execute(
            "UPDATE containers SET deleted_at = ?1, updated_at = ?1 WHERE deleted_at IS NULL",
            params![now],
        )
        .context("Failed to retire cached containers")?;

        for c in snapshot {
            tx.execute(
                "INSERT INTO containers (container_id, name, image, status, state, cpu_percent,
                 memory_usage, memory_limit, network_rx, network_tx, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(container_id) DO UPDATE SET
                    name = excluded.name,
                    image = excluded.image,
                    status = excluded.status,
                    state = excluded.state,
                    cpu_percent = excluded.cpu_percent,
                    memory_usage = excluded.memory_usage,
                    memory_limit = excluded.memory_limit,
                    network_rx = excluded.network_rx,
                    network_tx = excluded.network_tx,
                    updated_at = excluded.updated_at,
                    deleted_at = NULL",
                params![
                    c.container_id,
                    c.name,
                    c.image,
                    c.status,
                    c.state,
                    c.cpu_percent,
                    c.memory_usage,
                    c.memory_limit,
                    c.network_rx,
                    c.network_tx,
                    now
                ],
            )
            .with_context(|| format!("Failed to cache container {}", c.container_id))?;
        }

        tx.commit().context("Failed to commit container cache")?;
        Ok(())
    }

    pub fn list_cached_containers(&self) -> Result<Vec<CachedContainer>> {
        self.query_all(
            "SELECT id, container_id, name, image, status, state, cpu_percent, memory_usage,
             memory_limit, network_rx, network_tx, created_at, updated_at
             FROM containers WHERE deleted_at IS NULL ORDER BY name, id",
            [],
            ContainerRow::from_row,
        )?
        .into_iter()
        .map(ContainerRow::into_container)
        .collect()
    }

    // ── GitOps apps ───────────────────────────────────────────────────

    pub fn insert_gitops_app(&self, app: &NewGitOpsApp) -> Result<GitOpsApp> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO gitops_apps (name, repo_url, branch, path, namespace, sync_status,
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    app.name,
                    app.repo_url,
                    app.branch,
                    app.path,
                    app.namespace,
                    SyncStatus::Unknown.as_str(),
                    now
                ],
            )
            .context("Failed to insert gitops app")?;
        let id = self.conn.last_insert_rowid();
        self.get_gitops_app(id)?
            .context("GitOps app not found after insert")
    }

    pub fn list_gitops_apps(&self) -> Result<Vec<GitOpsApp>> {
        self.query_all(
            "SELECT id, name, repo_url, branch, path, namespace, sync_status, last_synced,
             created_at, updated_at
             FROM gitops_apps WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC",
            [],
            GitOpsAppRow::from_row,
        )?
        .into_iter()
        .map(GitOpsAppRow::into_app)
        .collect()
    }

    pub fn get_gitops_app(&self, id: i64) -> Result<Option<GitOpsApp>> {
        self.conn
            .query_row(
                "SELECT id, name, repo_url, branch, path, namespace, sync_status, last_synced,
                 created_at, updated_at
                 FROM gitops_apps WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                GitOpsAppRow::from_row,
            )
            .optional()
            .context("Failed to query gitops app")?
            .map(GitOpsAppRow::into_app)
            .transpose()
    }

    /// Record a successful sync at `at`.
    pub fn mark_gitops_synced(&self, id: i64, at: DateTime<Utc>) -> Result<GitOpsApp> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE gitops_apps SET sync_status = ?1, last_synced = ?2, updated_at = ?3
                 WHERE id = ?4 AND deleted_at IS NULL",
                params![SyncStatus::Synced.as_str(), format_ts(&at), now, id],
            )
            .context("Failed to mark gitops app synced")?;
        self.get_gitops_app(id)?
            .context("GitOps app not found after sync")
    }

    /// Record a failed sync. `last_synced` is left untouched.
    pub fn mark_gitops_out_of_sync(&self, id: i64) -> Result<()> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE gitops_apps SET sync_status = ?1, updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![SyncStatus::OutOfSync.as_str(), now, id],
            )
            .context("Failed to mark gitops app out of sync")?;
        Ok(())
    }

    /// Raw delete marker of a row regardless of liveness.
    #[cfg(test)]
    pub(crate) fn deleted_marker(&self, table: Table, id: i64) -> Result<Option<String>> {
        let sql = format!("SELECT deleted_at FROM {} WHERE id = ?1", table.as_str());
        self.conn
            .query_row(&sql, params![id], |row| row.get(0))
            .context("Failed to read delete marker")
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

struct ItemRow {
    id: i64,
    name: String,
    description: String,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_item(self) -> Result<Item> {
        Ok(Item {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct ProjectRow {
    id: i64,
    name: String,
    description: String,
    repo_url: String,
    status: String,
    color: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            repo_url: row.get(3)?,
            status: row.get(4)?,
            color: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: self.id,
            name: self.name,
            description: self.description,
            repo_url: self.repo_url,
            status: ProjectStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            color: self.color,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct TaskRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    status: String,
    priority: String,
    labels: String,
    assignee: String,
    due_date: Option<String>,
    estimated_hours: i32,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            labels: row.get(6)?,
            assignee: row.get(7)?,
            due_date: row.get(8)?,
            estimated_hours: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            priority: Priority::from_str(&self.priority).map_err(|e| anyhow::anyhow!(e))?,
            labels: self.labels,
            assignee: self.assignee,
            due_date: parse_opt_ts(self.due_date)?,
            estimated_hours: self.estimated_hours,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct ContainerRow {
    id: i64,
    container_id: String,
    name: String,
    image: String,
    status: String,
    state: String,
    cpu_percent: f64,
    memory_usage: i64,
    memory_limit: i64,
    network_rx: i64,
    network_tx: i64,
    created_at: String,
    updated_at: String,
}

impl ContainerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            container_id: row.get(1)?,
            name: row.get(2)?,
            image: row.get(3)?,
            status: row.get(4)?,
            state: row.get(5)?,
            cpu_percent: row.get(6)?,
            memory_usage: row.get(7)?,
            memory_limit: row.get(8)?,
            network_rx: row.get(9)?,
            network_tx: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_container(self) -> Result<CachedContainer> {
        Ok(CachedContainer {
            id: self.id,
            container_id: self.container_id,
            name: self.name,
            image: self.image,
            status: self.status,
            state: self.state,
            cpu_percent: self.cpu_percent,
            memory_usage: self.memory_usage,
            memory_limit: self.memory_limit,
            network_rx: self.network_rx,
            network_tx: self.network_tx,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct GitOpsAppRow {
    id: i64,
    name: String,
    repo_url: String,
    branch: String,
    path: String,
    namespace: String,
    sync_status: String,
    last_synced: Option<String>,
    created_at: String,
    updated_at: String,
}

impl GitOpsAppRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            repo_url: row.get(2)?,
            branch: row.get(3)?,
            path: row.get(4)?,
            namespace: row.get(5)?,
            sync_status: row.get(6)?,
            last_synced: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_app(self) -> Result<GitOpsApp> {
        Ok(GitOpsApp {
            id: self.id,
            name: self.name,
            repo_url: self.repo_url,
            branch: self.branch,
            path: self.path,
            namespace: self.namespace,
            sync_status: SyncStatus::from_str(&self.sync_status).map_err(|e| anyhow::anyhow!(e))?,
            last_synced: parse_opt_ts(self.last_synced)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            description: "A dashboard project".to_string(),
            repo_url: String::new(),
            status: ProjectStatus::Active,
            color: "#1976d2".to_string(),
        }
    }

    fn sample_task(project_id: i64, title: &str) -> NewTask {
        NewTask {
            project_id,
            title: title.to_string(),
            description: "Do the thing".to_string(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            labels: String::new(),
            assignee: String::new(),
            due_date: None,
            estimated_hours: 0,
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = DashboardDb::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_file_backed_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.db");
        {
            let db = DashboardDb::new(&path).unwrap();
            db.insert_item("persisted", "survives a reopen").unwrap();
        }
        let db = DashboardDb::new(&path).unwrap();
        let items = db.list_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "persisted");
    }

    #[test]
    fn test_item_insert_and_get_round_trip() {
        let db = DashboardDb::new_in_memory().unwrap();
        let item = db.insert_item("widget", "a useful widget").unwrap();
        let fetched = db.get_item(item.id).unwrap().unwrap();
        assert_eq!(fetched, item);
        assert_eq!(item.created_at, item.updated_at);
    }

    #[test]
    fn test_soft_delete_hides_row_but_keeps_it() {
        let db = DashboardDb::new_in_memory().unwrap();
        let item = db.insert_item("widget", "a useful widget").unwrap();
        assert!(db.soft_delete(Table::Items, item.id).unwrap());
        assert!(db.get_item(item.id).unwrap().is_none());
        assert!(db.list_items().unwrap().is_empty());
        assert!(db.deleted_marker(Table::Items, item.id).unwrap().is_some());
        // A second delete finds no live row.
        assert!(!db.soft_delete(Table::Items, item.id).unwrap());
    }

    #[test]
    fn test_partial_unique_index_allows_reuse_after_delete() {
        let db = DashboardDb::new_in_memory().unwrap();
        let first = db.insert_project(&sample_project("deck")).unwrap();
        assert!(db.insert_project(&sample_project("deck")).is_err());
        db.soft_delete(Table::Projects, first.id).unwrap();
        let second = db.insert_project(&sample_project("deck")).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_name_taken_excludes_self_and_deleted() {
        let db = DashboardDb::new_in_memory().unwrap();
        let item = db.insert_item("widget", "a useful widget").unwrap();
        assert!(db.name_taken(Table::Items, "widget", None).unwrap());
        assert!(!db.name_taken(Table::Items, "widget", Some(item.id)).unwrap());
        db.soft_delete(Table::Items, item.id).unwrap();
        assert!(!db.name_taken(Table::Items, "widget", None).unwrap());
    }

    #[test]
    fn test_lists_are_newest_first() {
        let db = DashboardDb::new_in_memory().unwrap();
        let a = db.insert_item("first", "the first item").unwrap();
        let b = db.insert_item("second", "the second item").unwrap();
        let ids: Vec<i64> = db.list_items().unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn test_task_filter_by_project() {
        let db = DashboardDb::new_in_memory().unwrap();
        let p1 = db.insert_project(&sample_project("one")).unwrap();
        let p2 = db.insert_project(&sample_project("two")).unwrap();
        db.insert_task(&sample_task(p1.id, "alpha")).unwrap();
        db.insert_task(&sample_task(p2.id, "beta")).unwrap();
        db.insert_task(&sample_task(p2.id, "gamma")).unwrap();

        assert_eq!(db.list_tasks(None).unwrap().len(), 3);
        let only_two = db.list_tasks(Some(p2.id)).unwrap();
        assert_eq!(only_two.len(), 2);
        assert!(only_two.iter().all(|t| t.project_id == p2.id));
    }

    #[test]
    fn test_task_due_date_round_trips() {
        let db = DashboardDb::new_in_memory().unwrap();
        let p = db.insert_project(&sample_project("dated")).unwrap();
        let due = Utc::now();
        let mut new_task = sample_task(p.id, "with due date");
        new_task.due_date = Some(due);
        let task = db.insert_task(&new_task).unwrap();
        assert_eq!(task.due_date, Some(due));
    }

    #[test]
    fn test_task_foreign_key_enforced() {
        let db = DashboardDb::new_in_memory().unwrap();
        assert!(db.insert_task(&sample_task(999, "orphan")).is_err());
    }

    #[test]
    fn test_counts_and_per_project_tally() {
        let db = DashboardDb::new_in_memory().unwrap();
        let p1 = db.insert_project(&sample_project("one")).unwrap();
        let mut archived = sample_project("two");
        archived.status = ProjectStatus::Archived;
        let p2 = db.insert_project(&archived).unwrap();
        let t = db.insert_task(&sample_task(p1.id, "alpha")).unwrap();
        db.insert_task(&sample_task(p1.id, "beta")).unwrap();
        db.soft_delete(Table::Tasks, t.id).unwrap();

        assert_eq!(db.count_projects(None).unwrap(), 2);
        assert_eq!(db.count_projects(Some(ProjectStatus::Active)).unwrap(), 1);
        assert_eq!(db.count_tasks(None).unwrap(), 1);
        assert_eq!(db.count_tasks(Some(TaskStatus::Todo)).unwrap(), 1);

        let tally = db.task_counts_per_project().unwrap();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally[0].project_id, p1.id);
        assert_eq!(tally[0].task_count, 1);
        assert_eq!(tally[1].project_id, p2.id);
        assert_eq!(tally[1].task_count, 0);
    }

    #[test]
    fn test_container_cache_replaces_snapshot() {
        let db = DashboardDb::new_in_memory().unwrap();
        let web = ContainerSnapshot {
            container_id: "abc123".into(),
            name: "web".into(),
            state: "running".into(),
            ..ContainerSnapshot::default()
        };
        let worker = ContainerSnapshot {
            container_id: "def456".into(),
            name: "worker".into(),
            state: "exited".into(),
            ..ContainerSnapshot::default()
        };
        db.replace_container_cache(&[web.clone(), worker]).unwrap();
        assert_eq!(db.list_cached_containers().unwrap().len(), 2);

        let mut web_again = web;
        web_again.cpu_percent = 12.5;
        db.replace_container_cache(&[web_again]).unwrap();
        let cached = db.list_cached_containers().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].container_id, "abc123");
        assert_eq!(cached[0].cpu_percent, 12.5);
    }

    #[test]
    fn test_gitops_sync_markers() {
        let db = DashboardDb::new_in_memory().unwrap();
        let app = db
            .insert_gitops_app(&NewGitOpsApp {
                name: "guestbook".into(),
                repo_url: "https://example.com/guestbook.git".into(),
                branch: "main".into(),
                path: "k8s".into(),
                namespace: "default".into(),
            })
            .unwrap();
        assert_eq!(app.sync_status, SyncStatus::Unknown);
        assert!(app.last_synced.is_none());

        let at = Utc::now();
        let synced = db.mark_gitops_synced(app.id, at).unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert_eq!(synced.last_synced, Some(at));

        db.mark_gitops_out_of_sync(app.id).unwrap();
        let after = db.get_gitops_app(app.id).unwrap().unwrap();
        assert_eq!(after.sync_status, SyncStatus::OutOfSync);
        assert_eq!(after.last_synced, Some(at));
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() {
        let handle = DbHandle::new(DashboardDb::new_in_memory().unwrap());
        let item = handle
            .call(|db| Ok(db.insert_item("async", "inserted via handle")?))
            .await
            .unwrap();
        let fetched = handle
            .call(move |db| Ok(db.get_item(item.id)?))
            .await
            .unwrap();
        assert_eq!(fetched, Some(item));

        let guard = handle.lock_sync().unwrap();
        assert_eq!(guard.get_item(fetched.unwrap().id).unwrap().unwrap().name, "async");
    }
}
