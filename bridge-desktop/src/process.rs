//! Command Runner Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    process::{CommandOutput, CommandRunner, CommandSpec, COMMAND_OUTPUT_TARGET},
};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands with `tokio::process`, capturing stdout and stderr
///
/// Stdin is closed. Output is decoded lossily as UTF-8 and replayed line by
/// line under the [`COMMAND_OUTPUT_TARGET`] tracing target: stdout at DEBUG,
/// stderr at WARN.
///
/// On unix each child runs in its own process group, so a terminal Ctrl+C
/// reaches only this process and the run stops at the next step boundary
/// instead of killing a command halfway.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn_error(spec: &CommandSpec, e: std::io::Error) -> BridgeError {
        BridgeError::CommandFailed {
            command: spec.to_string(),
            exit_status: None,
            stderr: e.to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let output = command
            .output()
            .await
            .map_err(|e| Self::spawn_error(spec, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: COMMAND_OUTPUT_TARGET, "{}", line);
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!(target: COMMAND_OUTPUT_TARGET, "{}", line);
        }

        let exit_status = output.status.code();
        debug!(command = %spec, exit_status = ?exit_status, "Command finished");

        CommandOutput::new(exit_status, stdout, stderr).check(spec)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2"]);

        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.exit_status, Some(0));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]);

        let err = runner.run(&spec).await.unwrap_err();
        match err {
            BridgeError::CommandFailed {
                exit_status, stderr, ..
            } => {
                assert_eq!(exit_status, Some(3));
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_allow_failure_returns_output() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "exit 2"]).allow_failure();

        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.exit_status, Some(2));
    }

    #[tokio::test]
    async fn test_missing_program_maps_to_command_failed() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("/nonexistent/definitely-not-a-program");

        let err = runner.run(&spec).await.unwrap_err();
        assert!(err.is_command_failure());
        assert_eq!(err.exit_status(), None);
        assert!(err.to_string().contains("/nonexistent/definitely-not-a-program"));
    }
}
