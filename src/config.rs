use std::path::PathBuf;

/// Runtime configuration for the dashboard server.
///
/// Built from CLI flags (each of which also reads an environment variable)
/// in `main.rs`; `Default` gives the local-development values.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Permissive CORS for a local frontend dev server.
    pub dev_mode: bool,
    pub cors_origins: Vec<String>,
    pub github_api_url: String,
    pub tools: ToolPaths,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            db_path: PathBuf::from(".clouddeck/clouddeck.db"),
            dev_mode: false,
            cors_origins: default_cors_origins(),
            github_api_url: "https://api.github.com".to_string(),
            tools: ToolPaths::default(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Executables shelled out to by the container inspector and GitOps syncer.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub docker: String,
    pub git: String,
    pub kubectl: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            git: "git".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

pub fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
    ]
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
