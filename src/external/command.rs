//! Base command execution abstraction
//!
//! Provides the foundational trait for executing external commands, enabling
//! dependency injection for testing. Every invocation carries a working
//! directory and an explicit timeout; a timeout is reported as an error and
//! never as a crash.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// stdout and stderr joined, for parsers that do not care which stream
    /// a diagnostic landed on
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },
    #[error("Command `{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },
    #[error("IO error: {message}")]
    Io { message: String },
}

/// Trait for executing external commands
///
/// This abstraction allows the rest of the codebase to execute commands
/// without directly depending on `tokio::process::Command`, enabling testing
/// with mock implementations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// Real implementation spawning child processes through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let started = Instant::now();
        debug!(program = %program, args = ?args, dir = %working_dir.display(), "Spawning command");

        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::CommandNotFound {
                        command: program.to_string(),
                    }
                } else {
                    CommandError::Io {
                        message: e.to_string(),
                    }
                }
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| CommandError::Io {
                message: e.to_string(),
            })?,
            Err(_) => {
                warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Command timed out");
                return Err(CommandError::Timeout {
                    command: render_command(program, args),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Render a command line for log and error messages
pub fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Split a configured argv into program and arguments
pub fn split_argv(argv: &[String]) -> Option<(&str, &[String])> {
    argv.split_first().map(|(program, args)| (program.as_str(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_process_command_executor_success() {
        let executor = ProcessCommandExecutor;
        let dir = std::env::temp_dir();
        let result = executor
            .execute(&dir, "echo", &args(&["hello"]), Duration::from_secs(5))
            .await;

        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_process_command_executor_command_not_found() {
        let executor = ProcessCommandExecutor;
        let dir = std::env::temp_dir();
        let result = executor
            .execute(&dir, "nonexistent_command_xyz", &[], Duration::from_secs(5))
            .await;

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            CommandError::CommandNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_process_command_executor_timeout() {
        let executor = ProcessCommandExecutor;
        let dir = std::env::temp_dir();
        let result = executor
            .execute(&dir, "sleep", &args(&["5"]), Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(CommandError::Timeout { timeout_ms: 100, .. })));
    }

    #[tokio::test]
    async fn test_mock_command_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .with(always(), eq("npm"), eq(args(&["run", "build"])), always())
            .times(1)
            .returning(|_, _, _, _| {
                Ok(CommandOutput {
                    status_code: 0,
                    stdout: "built\n".to_string(),
                    stderr: String::new(),
                    duration_ms: 3,
                })
            });

        let output = mock
            .execute(
                Path::new("."),
                "npm",
                &args(&["run", "build"]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "built\n");
    }

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            status_code: 1,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            duration_ms: 0,
        };
        assert_eq!(output.combined(), "out\nerr");
    }

    #[test]
    fn test_split_argv() {
        let argv = args(&["npx", "tsc", "--noEmit"]);
        let (program, rest) = split_argv(&argv).unwrap();
        assert_eq!(program, "npx");
        assert_eq!(rest, &args(&["tsc", "--noEmit"])[..]);
        assert!(split_argv(&[]).is_none());
    }
}
