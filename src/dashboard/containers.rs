//! Container listing and logs through the docker CLI.

use std::sync::Arc;

use serde::Deserialize;

use super::command::{CommandRunner, args};
use super::db::DbHandle;
use super::models::ContainerSnapshot;
use crate::errors::DashboardError;

pub const DEFAULT_LOG_TAIL: &str = "100";

/// One line of `docker ps --format '{{json .}}'`. Only the fields we use.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Clone)]
pub struct ContainerInspector {
    runner: Arc<dyn CommandRunner>,
    docker: String,
}

impl ContainerInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, docker: impl Into<String>) -> Self {
        Self {
            runner,
            docker: docker.into(),
        }
    }

    /// Run `docker --version`; `None` when the CLI is missing or broken.
    pub async fn detect(runner: Arc<dyn CommandRunner>, docker: &str) -> Option<Self> {
        match runner.run(docker, &args(["--version"])).await {
            Ok(out) if out.success => {
                tracing::info!(version = %out.stdout.trim(), "container runtime CLI detected");
                Some(Self::new(runner, docker))
            }
            Ok(out) => {
                tracing::warn!(output = %out.combined(), "container runtime CLI check failed, container routes disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "container runtime CLI not available, container routes disabled");
                None
            }
        }
    }

    /// All containers, with CPU and memory filled in for running ones.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>, DashboardError> {
        let ps_args = args(["ps", "-a", "--format", "{{json .}}"]);
        let out = self
            .runner
            .run(&self.docker, &ps_args)
            .await?
            .into_result(&self.docker, &ps_args)?;

        let mut containers: Vec<ContainerSnapshot> =
            out.stdout.lines().filter_map(parse_ps_line).collect();

        for container in containers.iter_mut().filter(|c| c.state == "running") {
            let stats_args = args([
                "stats",
                &container.container_id,
                "--no-stream",
                "--format",
                "{{.CPUPerc}}|{{.MemUsage}}",
            ]);
            match self.runner.run(&self.docker, &stats_args).await {
                Ok(out) if out.success => {
                    if let Some((cpu, usage, limit)) = parse_stats_line(&out.stdout) {
                        container.cpu_percent = cpu;
                        container.memory_usage = usage;
                        container.memory_limit = limit;
                    } else {
                        tracing::debug!(container_id = %container.container_id, "unparseable stats line");
                    }
                }
                Ok(out) => {
                    tracing::debug!(container_id = %container.container_id, output = %out.combined(), "docker stats failed");
                }
                Err(e) => {
                    tracing::debug!(container_id = %container.container_id, error = %e, "docker stats failed");
                }
            }
        }

        Ok(containers)
    }

    /// Last `tail` log lines (or `all`) of a container, stdout and stderr combined.
    pub async fn logs(&self, container_id: &str, tail: &str) -> Result<String, DashboardError> {
        let container_id = validate_container_id(container_id)?;
        let tail = validate_tail(tail)?;
        let log_args = args(["logs", "--tail", tail, container_id]);
        let out = self
            .runner
            .run(&self.docker, &log_args)
            .await?
            .into_result(&self.docker, &log_args)?;
        Ok(out.combined())
    }
}

/// Write a fresh listing into the `containers` table. Failures are logged only.
pub async fn cache_snapshot(db: &DbHandle, snapshot: Vec<ContainerSnapshot>) {
    let count = snapshot.len();
    match db
        .call(move |db| Ok(db.replace_container_cache(&snapshot)?))
        .await
    {
        Ok(()) => tracing::debug!(count, "container cache refreshed"),
        Err(e) => tracing::warn!(error = %e, "failed to refresh container cache"),
    }
}

fn validate_container_id(id: &str) -> Result<&str, DashboardError> {
    let id = id.trim();
    if id.is_empty() || id.starts_with('-') || id.chars().any(char::is_whitespace) {
        return Err(DashboardError::validation(format!("invalid container id '{}'", id)));
    }
    Ok(id)
}

fn validate_tail(tail: &str) -> Result<&str, DashboardError> {
    let tail = tail.trim();
    if tail == "all" || tail.parse::<u32>().is_ok_and(|n| n > 0) {
        Ok(tail)
    } else {
        Err(DashboardError::validation(format!(
            "tail must be a positive integer or 'all', got '{}'",
            tail
        )))
    }
}

/// Parse one `docker ps` JSON line; blank or malformed lines yield `None`.
pub fn parse_ps_line(line: &str) -> Option<ContainerSnapshot> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let ps: PsLine = serde_json::from_str(line).ok()?;
    Some(ContainerSnapshot {
        container_id: ps.id,
        name: ps.names.trim_start_matches('/').to_string(),
        image: ps.image,
        status: ps.status,
        state: ps.state,
        ..ContainerSnapshot::default()
    })
}

/// Parse `"<cpu>%|<usage> / <limit>"` into (cpu percent, usage bytes, limit bytes).
pub fn parse_stats_line(line: &str) -> Option<(f64, i64, i64)> {
    let (cpu, mem) = line.trim().split_once('|')?;
    let cpu = cpu.trim().trim_end_matches('%').parse::<f64>().ok()?;
    let (usage, limit) = mem.trim().split_once(" / ")?;
    Some((cpu, parse_memory(usage), parse_memory(limit)))
}

/// Convert a docker memory figure like `123.4MiB` to bytes on the 1024 scale.
/// Unknown units and malformed input give 0.
pub fn parse_memory(raw: &str) -> i64 {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let Ok(value) = number.parse::<f64>() else {
        return 0;
    };
    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KIB" | "KB" => 1024.0,
        "MIB" | "MB" => 1024.0 * 1024.0,
        "GIB" | "GB" => 1024.0 * 1024.0 * 1024.0,
        _ => return 0,
    };
    (value * multiplier) as i64
}
