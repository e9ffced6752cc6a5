use std::process::Stdio;

use async_trait::async_trait;

use crate::errors::DashboardError;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }

    /// Turn a non-zero exit into `DashboardError::Command` carrying the output.
    pub fn into_result(self, program: &str, args: &[String]) -> Result<Self, DashboardError> {
        if self.success {
            return Ok(self);
        }
        let label = match args.first() {
            Some(sub) => format!("{} {}", program, sub),
            None => program.to_string(),
        };
        Err(DashboardError::Command {
            program: label,
            output: self.combined(),
        })
    }
}

/// Abstraction over subprocess execution for testability.
/// Real implementation: `SystemCommandRunner`. Test double: `mock::ScriptedRunner`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion. An `Err` means the process
    /// could not be spawned; a non-zero exit is reported via `success`.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DashboardError>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DashboardError> {
        tracing::debug!(program, ?args, "running command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Build an owned argument vector from string slices.
pub fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            success: false,
            stdout: "cloning...\n".into(),
            stderr: "fatal: not found\n".into(),
        };
        assert_eq!(out.combined(), "cloning...\nfatal: not found");

        let only_err = CommandOutput {
            stderr: "boom".into(),
            ..CommandOutput::default()
        };
        assert_eq!(only_err.combined(), "boom");
    }

    #[test]
    fn test_into_result_labels_subcommand() {
        let out = CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "error: unable to recognize".into(),
        };
        let err = out
            .into_result("kubectl", &args(["apply", "-f", "."]))
            .unwrap_err();
        assert_eq!(err.to_string(), "kubectl apply failed: error: unable to recognize");
    }

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let out = SystemCommandRunner
            .run("sh", &args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary_is_io_error() {
        let err = SystemCommandRunner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Io(_)));
    }
}
