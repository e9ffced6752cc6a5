use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::command::{CommandRunner, SystemCommandRunner};
use super::containers::ContainerInspector;
use super::db::{DashboardDb, DbHandle};
use super::github::GitHubClient;
use super::gitops::GitOpsSyncer;
use super::kubernetes::ClusterReader;
use crate::config::ServerConfig;

/// CORS for the configured frontend origins, or anything in dev mode.
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.dev_mode {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Build the full application router with CORS and request tracing.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let routes = api::api_router(&state);
    routes
        .with_state(Arc::new(state))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

/// Open the database and create every optional client. Container and
/// cluster access degrade to `None` when unavailable.
pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = DashboardDb::new(&config.db_path).context("Failed to initialize dashboard database")?;
    let github = GitHubClient::new(&config.github_api_url)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);

    let containers = ContainerInspector::detect(runner.clone(), &config.tools.docker).await;
    let cluster = match ClusterReader::connect().await {
        Ok(reader) => Some(reader),
        Err(e) => {
            tracing::warn!(error = %e, "kubernetes client not available; cluster routes disabled");
            None
        }
    };

    let gitops = GitOpsSyncer::new(runner, &config.tools.git, &config.tools.kubectl);

    Ok(AppState {
        db: DbHandle::new(db),
        github,
        containers,
        cluster,
        gitops,
    })
}

/// Start the dashboard server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, dev_mode = config.dev_mode, "clouddeck backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
