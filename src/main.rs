use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clouddeck::config::{ServerConfig, ToolPaths, parse_origin_list};
use clouddeck::dashboard::{db::DashboardDb, server};
use clouddeck::telemetry;

#[derive(Parser)]
#[command(name = "clouddeck")]
#[command(version, about = "Cloud dashboard backend: projects, containers, clusters and CI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        #[arg(short, long, env = "PORT", default_value = "8080")]
        port: u16,

        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "DATABASE_PATH", default_value = ".clouddeck/clouddeck.db")]
        db_path: PathBuf,

        /// Enable dev mode (CORS permissive for a local frontend dev server)
        #[arg(long)]
        dev: bool,

        /// Comma-separated list of allowed CORS origins
        #[arg(long, env = "CORS_ALLOWED_ORIGINS")]
        cors_origins: Option<String>,

        #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
        github_api_url: String,

        #[arg(long, env = "DOCKER_BIN", default_value = "docker")]
        docker_bin: String,

        #[arg(long, env = "GIT_BIN", default_value = "git")]
        git_bin: String,

        #[arg(long, env = "KUBECTL_BIN", default_value = "kubectl")]
        kubectl_bin: String,

        /// Emit logs as one JSON object per line
        #[arg(long, env = "LOG_JSON")]
        log_json: bool,
    },
    /// Create or migrate the database schema, then exit
    Migrate {
        #[arg(long, env = "DATABASE_PATH", default_value = ".clouddeck/clouddeck.db")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
            cors_origins,
            github_api_url,
            docker_bin,
            git_bin,
            kubectl_bin,
            log_json,
        } => {
            telemetry::init_tracing(log_json);
            let defaults = ServerConfig::default();
            let config = ServerConfig {
                host,
                port,
                db_path,
                dev_mode: dev,
                cors_origins: cors_origins
                    .as_deref()
                    .map(parse_origin_list)
                    .filter(|origins| !origins.is_empty())
                    .unwrap_or(defaults.cors_origins),
                github_api_url,
                tools: ToolPaths {
                    docker: docker_bin,
                    git: git_bin,
                    kubectl: kubectl_bin,
                },
                log_json,
            };
            server::start_server(config).await?;
        }
        Commands::Migrate { db_path } => {
            telemetry::init_tracing(false);
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
            DashboardDb::new(&db_path)
                .with_context(|| format!("Failed to migrate {}", db_path.display()))?;
            println!("Database ready at {}", db_path.display());
        }
    }

    Ok(())
}
