//! Typed error hierarchy for the dashboard backend.
//!
//! `DashboardError` is the single error type crossing service boundaries.
//! The storage layer and HTTP clients work in `anyhow` internally and get
//! wrapped into one of the downstream variants here; the API layer maps each
//! variant onto an HTTP status category.

use thiserror::Error;

/// Errors surfaced by dashboard services.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} with this name already exists")]
    AlreadyExists { entity: &'static str },

    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    /// An external command ran but exited unsuccessfully.
    #[error("{program} failed: {output}")]
    Command { program: String, output: String },

    #[error("GitHub API error: {0:#}")]
    GitHub(#[source] anyhow::Error),

    #[error("Kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad category of a [`DashboardError`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Downstream,
}

impl DashboardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::AlreadyExists { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Database(_)
            | Self::LockPoisoned
            | Self::Command { .. }
            | Self::GitHub(_)
            | Self::Kubernetes(_)
            | Self::Io(_) => ErrorCategory::Downstream,
        }
    }
}
