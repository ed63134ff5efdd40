//! Command execution utilities
//!
//! Runs external commands through `sh -c` with a hard timeout, so a wedged
//! child can never stall the caller. The child is killed when the timeout
//! elapses.

use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Failure to obtain any exit status from a command.
///
/// A command that ran and exited non-zero is not an error at this level;
/// inspect [`CommandOutput::success`] instead.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// "exit N", or "signal" when the process was killed by a signal.
    pub fn exit_description(&self) -> String {
        self.code
            .map(|c| format!("exit {}", c))
            .unwrap_or_else(|| "signal".to_string())
    }
}

/// Run a shell command line and return its output.
///
/// stdin is closed, stdout and stderr are captured and trimmed.
#[instrument(skip_all, fields(cmd = %command))]
pub async fn run_shell(command: &str, timeout: Duration) -> Result<CommandOutput, CommandError> {
    debug!(timeout_ms = timeout.as_millis() as u64, "Running command");

    let mut cmd = Command::new("sh");
    cmd
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(CommandError::Timeout {
                command: command.to_string(),
                timeout,
            })
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Something that can execute shell command lines.
///
/// Production code uses [`SystemShell`]; tests swap in a recording stub.
pub trait ShellRunner {
    fn run_shell(
        &self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send;
}

/// Runs commands on the host through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl ShellRunner for SystemShell {
    fn run_shell(
        &self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send {
        let command = command.to_string();
        async move { run_shell(&command, timeout).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = run_shell("echo hello", Duration::from_secs(5)).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let output = run_shell("echo oops >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr, "oops");
        assert_eq!(output.exit_description(), "exit 3");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = std::time::Instant::now();
        let err = SystemShell
            .run_shell("sleep 10", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_signal_exit_description() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            success: false,
            code: None,
        };
        assert_eq!(output.exit_description(), "signal");
    }
}
