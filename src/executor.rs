// file: src/executor.rs
// version: 3.0.0
// guid: bb371682-35cb-4f34-b318-8bf69ec125bd

//! Argument-vector command execution
//!
//! Nothing in this crate builds a shell string. Every external program is
//! described by a [`CommandSpec`] and run through a [`CommandRunner`], so that
//! validated values can never be re-parsed by a shell.

use crate::error::{BootstrapError, Result};
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// A program plus its arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a command that exited 0 with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Output of a command that exited with `code`
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for executing commands
///
/// `run` only fails when the program could not be started or timed out; a
/// non-zero exit is reported through [`CommandOutput`].
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Whether commands are only being reported, not executed
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Run a command and turn a non-zero exit into [`BootstrapError::Process`]
pub async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec).await?;
    if output.success() {
        return Ok(output);
    }

    Err(BootstrapError::Process {
        command: spec.to_string(),
        exit_code: output.exit_code,
        stderr: if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        },
    })
}

/// Executes commands on the local machine with a timeout
pub struct LocalRunner {
    timeout: Duration,
}

impl LocalRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(900))
    }
}

#[async_trait::async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Executing: {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| BootstrapError::Process {
            command: spec.to_string(),
            exit_code: None,
            stderr: format!("Failed to execute command: {}", e),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BootstrapError::Process {
                command: spec.to_string(),
                exit_code: None,
                stderr: format!("timed out after {} seconds", self.timeout.as_secs()),
            })??;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.success() {
            error!("Command '{}' failed with exit code {:?}", spec.program, result.exit_code);
            if !result.stderr.trim().is_empty() {
                debug!("STDERR: {}", result.stderr.trim());
            }
        }

        Ok(result)
    }
}

/// Reports commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunRunner;

#[async_trait::async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        info!("[dry-run] would execute: {}", spec);
        Ok(CommandOutput::ok(""))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("apt-get")
            .args(["install", "-y", "git"])
            .env("DEBIAN_FRONTEND", "noninteractive");
        assert_eq!(
            spec.to_string(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y git"
        );
    }

    #[tokio::test]
    async fn test_local_runner_captures_output() {
        let runner = LocalRunner::new(Duration::from_secs(10));
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_runner_missing_program() {
        let runner = LocalRunner::default();
        let err = runner
            .run(&CommandSpec::new("nonexistent-command-12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Process { exit_code: None, .. }));
    }

    #[tokio::test]
    async fn test_run_checked_maps_failure() {
        let runner = LocalRunner::default();
        let err = run_checked(&runner, &CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 1"]))
            .await
            .unwrap_err();
        match err {
            BootstrapError::Process { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_runner_never_executes() {
        let runner = DryRunRunner;
        let output = runner
            .run(&CommandSpec::new("nonexistent-command-12345"))
            .await
            .unwrap();
        assert!(output.success());
        assert!(runner.is_dry_run());
    }
}
