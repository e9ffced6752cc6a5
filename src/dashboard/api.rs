use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::cicd;
use super::containers::{self, ContainerInspector, DEFAULT_LOG_TAIL};
use super::db::DbHandle;
use super::github::GitHubClient;
use super::gitops::{self, GitOpsSyncer};
use super::importer;
use super::kubernetes::{ClusterReader, DEFAULT_LOG_LINES};
use super::models::*;
use super::service;
use crate::errors::{DashboardError, ErrorCategory};

pub const SERVICE_NAME: &str = "clouddeck-backend";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub github: GitHubClient,
    /// `None` when the container CLI check failed at startup.
    pub containers: Option<ContainerInspector>,
    /// `None` when no cluster credentials resolved at startup.
    pub cluster: Option<ClusterReader>,
    pub gitops: GitOpsSyncer,
}

pub type SharedState = Arc<AppState>;

// ── Response envelope ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn respond<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> Response {
    let body = Envelope {
        success: true,
        message: message.to_string(),
        data,
        error: None,
    };
    (status, Json(body)).into_response()
}

fn ok<T: Serialize>(message: &str, data: T) -> Response {
    respond(StatusCode::OK, message, Some(data))
}

fn created<T: Serialize>(message: &str, data: T) -> Response {
    respond(StatusCode::CREATED, message, Some(data))
}

fn ok_empty(message: &str) -> Response {
    respond::<()>(StatusCode::OK, message, None)
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest { message: String, detail: String },
    NotFound { message: String, detail: String },
    Internal { message: String, detail: String },
}

impl ApiError {
    fn bad_request(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Map a service error onto a status, with `context` as the headline.
    fn from_service(context: &str, err: DashboardError) -> Self {
        let detail = err.to_string();
        match err.category() {
            ErrorCategory::Validation => Self::BadRequest {
                message: context.to_string(),
                detail,
            },
            ErrorCategory::NotFound => Self::NotFound {
                message: detail.clone(),
                detail,
            },
            ErrorCategory::Downstream => {
                tracing::error!(error = %detail, "{}", context);
                Self::Internal {
                    message: context.to_string(),
                    detail,
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match self {
            ApiError::BadRequest { message, detail } => (StatusCode::BAD_REQUEST, message, detail),
            ApiError::NotFound { message, detail } => (StatusCode::NOT_FOUND, message, detail),
            ApiError::Internal { message, detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message, detail)
            }
        };
        let body = Envelope::<()> {
            success: false,
            message,
            data: None,
            error: Some(detail),
        };
        (status, Json(body)).into_response()
    }
}

trait OrApi<T> {
    fn or_api(self, context: &str) -> Result<T, ApiError>;
}

impl<T> OrApi<T> for Result<T, DashboardError> {
    fn or_api(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_service(context, e))
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request("Invalid request body", e.body_text()))
}

fn path_param<T>(path: Result<Path<T>, PathRejection>, message: &str) -> Result<T, ApiError> {
    path.map(|Path(v)| v)
        .map_err(|e| ApiError::bad_request(message, e.body_text()))
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path_param(path, "Invalid ID")
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    q.map(|Query(v)| v)
        .map_err(|e| ApiError::bad_request("Invalid query parameters", e.body_text()))
}

/// Trimmed, non-empty value of every field, or `None` if any is missing.
fn all_present<const N: usize>(fields: [&Option<String>; N]) -> Option<[String; N]> {
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, field) in out.iter_mut().zip(fields) {
        let value = field.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        *slot = value.to_string();
    }
    Some(out)
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPrsQuery {
    pub token: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepoQuery {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncPrsRequest {
    pub token: Option<String>,
    pub username: Option<String>,
    pub project_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncIssuesRequest {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub project_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerLogsQuery {
    pub tail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodLogsQuery {
    pub lines: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
}

// ── Router ────────────────────────────────────────────────────────────

/// All routes. The container and Kubernetes groups are only mounted when
/// their clients initialized.
pub fn api_router(state: &AppState) -> Router<SharedState> {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/items", get(list_items).post(create_item))
        .route(
            "/api/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/stats", get(project_stats))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/stats", get(task_stats))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/github/prs", get(github_prs))
        .route("/api/github/issues", get(github_issues))
        .route("/api/github/sync-prs", post(github_sync_prs))
        .route("/api/github/sync-issues", post(github_sync_issues))
        .route("/api/gitops/apps", get(list_gitops_apps).post(create_gitops_app))
        .route(
            "/api/gitops/apps/{id}",
            get(get_gitops_app).delete(delete_gitops_app),
        )
        .route("/api/gitops/apps/{id}/sync", post(sync_gitops_app))
        .route("/api/cicd/runs", get(cicd_runs))
        .route("/api/cicd/stats", get(cicd_stats))
        .route("/api/cicd/workflows", get(cicd_workflows));

    if let Some(inspector) = &state.containers {
        let routes = ContainerRoutes {
            db: state.db.clone(),
            inspector: inspector.clone(),
        };
        router = router.merge(
            Router::new()
                .route("/api/containers", get(list_containers))
                .route("/api/containers/cached", get(list_cached_containers))
                .route("/api/containers/{id}/logs", get(container_logs))
                .with_state(routes),
        );
    }
    if let Some(cluster) = &state.cluster {
        router = router.merge(
            Router::new()
                .route("/api/kubernetes/pods", get(k8s_pods))
                .route("/api/kubernetes/deployments", get(k8s_deployments))
                .route("/api/kubernetes/services", get(k8s_services))
                .route("/api/kubernetes/namespaces", get(k8s_namespaces))
                .route(
                    "/api/kubernetes/pods/{namespace}/{pod}/logs",
                    get(k8s_pod_logs),
                )
                .with_state(cluster.clone()),
        );
    }
    router
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        service: SERVICE_NAME,
    })
}

// Items

async fn list_items(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let items = state
        .db
        .call(service::list_items)
        .await
        .or_api("Failed to fetch items")?;
    Ok(ok("Items fetched successfully", items))
}

async fn create_item(
    State(state): State<SharedState>,
    body: Result<Json<ItemCreateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;
    let item = state
        .db
        .call(move |db| service::create_item(db, input))
        .await
        .or_api("Failed to create item")?;
    Ok(created("Item created successfully", item))
}

async fn get_item(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let item = state
        .db
        .call(move |db| service::get_item(db, id))
        .await
        .or_api("Failed to fetch item")?;
    Ok(ok("Item fetched successfully", item))
}

async fn update_item(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ItemUpdateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let input = json_body(body)?;
    let item = state
        .db
        .call(move |db| service::update_item(db, id, input))
        .await
        .or_api("Failed to update item")?;
    Ok(ok("Item updated successfully", item))
}

async fn delete_item(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state
        .db
        .call(move |db| service::delete_item(db, id))
        .await
        .or_api("Failed to delete item")?;
    Ok(ok_empty("Item deleted successfully"))
}

// Projects

async fn list_projects(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let projects = state
        .db
        .call(service::list_projects)
        .await
        .or_api("Failed to fetch projects")?;
    Ok(ok("Projects fetched successfully", projects))
}

async fn create_project(
    State(state): State<SharedState>,
    body: Result<Json<ProjectCreateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;
    let project = state
        .db
        .call(move |db| service::create_project(db, input))
        .await
        .or_api("Failed to create project")?;
    Ok(created("Project created successfully", project))
}

async fn get_project(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let project = state
        .db
        .call(move |db| service::get_project(db, id))
        .await
        .or_api("Failed to fetch project")?;
    Ok(ok("Project fetched successfully", project))
}

async fn update_project(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ProjectUpdateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let input = json_body(body)?;
    let project = state
        .db
        .call(move |db| service::update_project(db, id, input))
        .await
        .or_api("Failed to update project")?;
    Ok(ok("Project updated successfully", project))
}

async fn delete_project(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state
        .db
        .call(move |db| service::delete_project(db, id))
        .await
        .or_api("Failed to delete project")?;
    Ok(ok_empty("Project deleted successfully"))
}

async fn project_stats(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let stats = state
        .db
        .call(service::project_stats)
        .await
        .or_api("Failed to fetch stats")?;
    Ok(ok("Stats fetched successfully", stats))
}

// Tasks

async fn list_tasks(
    State(state): State<SharedState>,
    q: Result<Query<TaskListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let project_id = query(q)?.project_id;
    let tasks = state
        .db
        .call(move |db| service::list_tasks(db, project_id))
        .await
        .or_api("Failed to fetch tasks")?;
    Ok(ok("Tasks fetched successfully", tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    body: Result<Json<TaskCreateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;
    let task = state
        .db
        .call(move |db| service::create_task(db, input))
        .await
        .or_api("Failed to create task")?;
    tracing::info!(task_id = task.id, project_id = task.project_id, "task created");
    Ok(created("Task created successfully", task))
}

async fn get_task(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let task = state
        .db
        .call(move |db| service::get_task(db, id))
        .await
        .or_api("Failed to fetch task")?;
    Ok(ok("Task fetched successfully", task))
}

async fn update_task(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<TaskUpdateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let input = json_body(body)?;
    let task = state
        .db
        .call(move |db| service::update_task(db, id, input))
        .await
        .or_api("Failed to update task")?;
    Ok(ok("Task updated successfully", task))
}

async fn delete_task(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state
        .db
        .call(move |db| service::delete_task(db, id))
        .await
        .or_api("Failed to delete task")?;
    Ok(ok_empty("Task deleted successfully"))
}

async fn task_stats(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let stats = state
        .db
        .call(service::task_stats)
        .await
        .or_api("Failed to fetch stats")?;
    Ok(ok("Stats fetched successfully", stats))
}

// GitHub

async fn github_prs(
    State(state): State<SharedState>,
    q: Result<Query<UserPrsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let q = query(q)?;
    let [token, username] = all_present([&q.token, &q.username])
        .ok_or_else(|| ApiError::bad_request("Token and username are required", ""))?;
    let prs = state
        .github
        .list_user_prs(&token, &username)
        .await
        .or_api("Failed to fetch PRs")?;
    Ok(ok("PRs fetched successfully", prs))
}

async fn github_issues(
    State(state): State<SharedState>,
    q: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let q = query(q)?;
    let [token, owner, repo] = all_present([&q.token, &q.owner, &q.repo])
        .ok_or_else(|| ApiError::bad_request("Token, owner, and repo are required", ""))?;
    let issues = state
        .github
        .list_repo_issues(&token, &owner, &repo)
        .await
        .or_api("Failed to fetch issues")?;
    Ok(ok("Issues fetched successfully", issues))
}

async fn github_sync_prs(
    State(state): State<SharedState>,
    body: Result<Json<SyncPrsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(body)?;
    let [token, username] = all_present([&req.token, &req.username])
        .filter(|_| req.project_id > 0)
        .ok_or_else(|| {
            ApiError::bad_request("Invalid request", "token, username and project_id are required")
        })?;
    let summary =
        importer::sync_prs_to_tasks(&state.db, &state.github, &token, &username, req.project_id)
            .await
            .or_api("Failed to sync PRs")?;
    Ok(ok("PRs synced to tasks successfully", summary))
}

async fn github_sync_issues(
    State(state): State<SharedState>,
    body: Result<Json<SyncIssuesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(body)?;
    let [token, owner, repo] = all_present([&req.token, &req.owner, &req.repo])
        .filter(|_| req.project_id > 0)
        .ok_or_else(|| {
            ApiError::bad_request(
                "Invalid request",
                "token, owner, repo and project_id are required",
            )
        })?;
    let summary = importer::sync_issues_to_tasks(
        &state.db,
        &state.github,
        &token,
        &owner,
        &repo,
        req.project_id,
    )
    .await
    .or_api("Failed to sync issues")?;
    Ok(ok("Issues synced to tasks successfully", summary))
}

// Containers

/// State of the container route group, mounted only when the CLI was found.
#[derive(Clone)]
struct ContainerRoutes {
    db: DbHandle,
    inspector: ContainerInspector,
}

async fn list_containers(State(routes): State<ContainerRoutes>) -> Result<Response, ApiError> {
    let list = routes
        .inspector
        .list_containers()
        .await
        .or_api("Failed to fetch containers")?;
    containers::cache_snapshot(&routes.db, list.clone()).await;
    Ok(ok("Containers fetched successfully", list))
}

async fn list_cached_containers(State(routes): State<ContainerRoutes>) -> Result<Response, ApiError> {
    let cached = routes
        .db
        .call(|db| Ok(db.list_cached_containers()?))
        .await
        .or_api("Failed to fetch cached containers")?;
    Ok(ok("Cached containers fetched successfully", cached))
}

async fn container_logs(
    State(routes): State<ContainerRoutes>,
    id: Result<Path<String>, PathRejection>,
    q: Result<Query<ContainerLogsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let id = path_param(id, "Invalid container ID")?;
    let tail = query(q)?.tail.unwrap_or_else(|| DEFAULT_LOG_TAIL.to_string());
    let logs = routes
        .inspector
        .logs(&id, &tail)
        .await
        .or_api("Failed to fetch logs")?;
    Ok(ok("Logs fetched successfully", LogsResponse { logs }))
}

// Kubernetes

fn namespace_or_all(q: Result<Query<NamespaceQuery>, QueryRejection>) -> Result<String, ApiError> {
    Ok(query(q)?.namespace.unwrap_or_else(|| "all".to_string()))
}

async fn k8s_pods(
    State(cluster): State<ClusterReader>,
    q: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let namespace = namespace_or_all(q)?;
    let pods = cluster
        .list_pods(&namespace)
        .await
        .or_api("Failed to fetch pods")?;
    Ok(ok("Pods fetched successfully", pods))
}

async fn k8s_deployments(
    State(cluster): State<ClusterReader>,
    q: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let namespace = namespace_or_all(q)?;
    let deployments = cluster
        .list_deployments(&namespace)
        .await
        .or_api("Failed to fetch deployments")?;
    Ok(ok("Deployments fetched successfully", deployments))
}

async fn k8s_services(
    State(cluster): State<ClusterReader>,
    q: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let namespace = namespace_or_all(q)?;
    let services = cluster
        .list_services(&namespace)
        .await
        .or_api("Failed to fetch services")?;
    Ok(ok("Services fetched successfully", services))
}

async fn k8s_namespaces(State(cluster): State<ClusterReader>) -> Result<Response, ApiError> {
    let namespaces = cluster
        .list_namespaces()
        .await
        .or_api("Failed to fetch namespaces")?;
    Ok(ok("Namespaces fetched successfully", namespaces))
}

async fn k8s_pod_logs(
    State(cluster): State<ClusterReader>,
    target: Result<Path<(String, String)>, PathRejection>,
    q: Result<Query<PodLogsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let (namespace, pod) = path_param(target, "Invalid namespace or pod name")?;
    let lines = query(q)?.lines.unwrap_or(DEFAULT_LOG_LINES);
    let logs = cluster
        .pod_logs(&namespace, &pod, lines)
        .await
        .or_api("Failed to fetch pod logs")?;
    Ok(ok("Logs fetched successfully", LogsResponse { logs }))
}

// GitOps

async fn list_gitops_apps(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let apps = state
        .db
        .call(gitops::list_apps)
        .await
        .or_api("Failed to fetch apps")?;
    Ok(ok("Apps fetched successfully", apps))
}

async fn create_gitops_app(
    State(state): State<SharedState>,
    body: Result<Json<GitOpsAppCreateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;
    let app = state
        .db
        .call(move |db| gitops::create_app(db, input))
        .await
        .or_api("Failed to create GitOps app")?;
    Ok(created("GitOps app created successfully", app))
}

async fn get_gitops_app(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let app = state
        .db
        .call(move |db| gitops::get_app(db, id))
        .await
        .or_api("Failed to fetch app")?;
    Ok(ok("App fetched successfully", app))
}

async fn delete_gitops_app(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state
        .db
        .call(move |db| gitops::delete_app(db, id))
        .await
        .or_api("Delete failed")?;
    Ok(ok_empty("App deleted successfully"))
}

async fn sync_gitops_app(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let app = state
        .gitops
        .sync_app(&state.db, id)
        .await
        .or_api("Sync failed")?;
    Ok(ok("App synced successfully", app))
}

// CI/CD

fn repo_params(q: Result<Query<RepoQuery>, QueryRejection>) -> Result<([String; 3], Option<u32>), ApiError> {
    let q = query(q)?;
    let params = all_present([&q.token, &q.owner, &q.repo])
        .ok_or_else(|| ApiError::bad_request("Token, owner, and repo are required", ""))?;
    Ok((params, q.limit))
}

async fn cicd_runs(
    State(state): State<SharedState>,
    q: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let ([token, owner, repo], limit) = repo_params(q)?;
    let limit = limit.unwrap_or(cicd::DEFAULT_RUN_LIMIT);
    let runs = cicd::list_workflow_runs(&state.github, &token, &owner, &repo, limit)
        .await
        .or_api("Failed to fetch workflow runs")?;
    Ok(ok("Workflow runs fetched successfully", runs))
}

async fn cicd_stats(
    State(state): State<SharedState>,
    q: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let ([token, owner, repo], _) = repo_params(q)?;
    let stats = cicd::pipeline_stats(&state.github, &token, &owner, &repo)
        .await
        .or_api("Failed to fetch pipeline stats")?;
    Ok(ok("Pipeline stats fetched successfully", stats))
}

async fn cicd_workflows(
    State(state): State<SharedState>,
    q: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let ([token, owner, repo], _) = repo_params(q)?;
    let workflows = cicd::list_workflows(&state.github, &token, &owner, &repo)
        .await
        .or_api("Failed to fetch workflows")?;
    Ok(ok("Workflows fetched successfully", workflows))
}

// ── Tests ─────────────────────────────────────────────────────────────
