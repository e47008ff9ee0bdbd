//! External Process Abstractions
//!
//! Every filesystem mutation the maintenance core performs is a single
//! invocation of an external program (`btrfs`, `mv`, `mount`, `snapraid`).
//! [`CommandRunner`] is the one place where those invocations happen and
//! where OS-level failures are turned into [`BridgeError::CommandFailed`].

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::{BridgeError, Result};

/// Tracing target for the captured stdout/stderr of external commands
pub const COMMAND_OUTPUT_TARGET: &str = "command_output";

/// Description of one external command invocation
///
/// Built with a small builder so call sites read like the command line they
/// produce:
///
/// ```
/// use bridge_traits::process::CommandSpec;
///
/// let spec = CommandSpec::new("btrfs")
///     .args(["subvolume", "snapshot", "-r", "/mnt/d1/snapraid", "/mnt/d1/snapraid.1"]);
/// assert_eq!(spec.to_string(), "btrfs subvolume snapshot -r /mnt/d1/snapraid /mnt/d1/snapraid.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Do not fail on an unaccepted exit status; the caller inspects it.
    pub allow_failure: bool,
    /// Exit codes treated as success. Defaults to `[0]`.
    pub success_codes: Vec<i32>,
    /// The command only observes state and is safe to run in dry-run mode.
    pub read_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            allow_failure: false,
            success_codes: vec![0],
            read_only: false,
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

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn success_codes(mut self, codes: &[i32]) -> Self {
        self.success_codes = codes.to_vec();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Whether `exit_status` counts as success for this command.
    ///
    /// A process killed by a signal has no exit status and never succeeds.
    pub fn accepts(&self, exit_status: Option<i32>) -> bool {
        exit_status.is_some_and(|code| self.success_codes.contains(&code))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_status: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Exit status 0 with no output, as reported for commands that were not
    /// actually executed.
    pub fn synthetic_success() -> Self {
        Self::new(Some(0), "", "")
    }

    /// Classify the output against `spec`.
    ///
    /// Returns the output unchanged if the exit status is accepted or the
    /// spec allows failure, otherwise a [`BridgeError::CommandFailed`].
    pub fn check(self, spec: &CommandSpec) -> Result<CommandOutput> {
        if spec.allow_failure || spec.accepts(self.exit_status) {
            Ok(self)
        } else {
            Err(BridgeError::CommandFailed {
                command: spec.to_string(),
                exit_status: self.exit_status,
                stderr: self.stderr,
            })
        }
    }
}

/// External command runner trait
///
/// Implementations execute the program described by a [`CommandSpec`] to
/// completion and capture its output. They must:
/// - return `Err(BridgeError::CommandFailed)` with `exit_status: None` when the
///   program could not be started;
/// - return `Err(BridgeError::CommandFailed)` when the exit status is not
///   accepted by the command, unless it allows failure.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::process::{CommandRunner, CommandSpec};
///
/// async fn delete(runner: &dyn CommandRunner, path: &str) -> Result<()> {
///     runner.run(&CommandSpec::new("btrfs").args(["subvolume", "delete", path])).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and wait for it to exit
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = CommandSpec::new("mv").args(["-v", "a", "b"]);

        assert_eq!(spec.program, "mv");
        assert_eq!(spec.args, vec!["-v", "a", "b"]);
        assert!(!spec.allow_failure);
        assert!(!spec.read_only);
        assert!(spec.accepts(Some(0)));
        assert!(!spec.accepts(Some(1)));
        assert!(!spec.accepts(None));
    }

    #[test]
    fn test_spec_display_quotes_whitespace() {
        let spec = CommandSpec::new("btrfs")
            .args(["subvolume", "delete"])
            .arg("/mnt/my disk/snapraid");

        assert_eq!(spec.to_string(), "btrfs subvolume delete '/mnt/my disk/snapraid'");
    }

    #[test]
    fn test_check_accepts_custom_success_codes() {
        let spec = CommandSpec::new("snapraid").arg("diff").success_codes(&[0, 2]);

        let output = CommandOutput::new(Some(2), "  3 added\n", "");
        assert!(output.check(&spec).is_ok());

        let output = CommandOutput::new(Some(1), "", "boom");
        let err = output.check(&spec).unwrap_err();
        match err {
            BridgeError::CommandFailed {
                command,
                exit_status,
                stderr,
            } => {
                assert_eq!(command, "snapraid diff");
                assert_eq!(exit_status, Some(1));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_allow_failure() {
        let spec = CommandSpec::new("umount").arg("/mnt/snapraid/d1").allow_failure();
        let output = CommandOutput::new(Some(32), "", "not mounted").check(&spec).unwrap();

        assert_eq!(output.exit_status, Some(32));
    }

    #[test]
    fn test_synthetic_success() {
        let output = CommandOutput::synthetic_success();
        assert_eq!(output.exit_status, Some(0));
        assert!(output.stdout.is_empty());
        assert!(output.check(&CommandSpec::new("true")).is_ok());
    }
}
