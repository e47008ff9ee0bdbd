use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Command failed: \"{command}\" ({}): {}", describe_exit(.exit_status), describe_stderr(.stderr))]
    CommandFailed {
        command: String,
        exit_status: Option<i32>,
        stderr: String,
    },

    #[error("Lock {0} is held by another process")]
    LockHeld(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Exit status of a failed command, if the error is a command failure and
    /// the process actually ran.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            BridgeError::CommandFailed { exit_status, .. } => *exit_status,
            _ => None,
        }
    }

    pub fn is_command_failure(&self) -> bool {
        matches!(self, BridgeError::CommandFailed { .. })
    }
}

fn describe_exit(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("err={}", code),
        None => "not started".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "no error output".to_string()
    } else {
        trimmed.to_string()
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = BridgeError::CommandFailed {
            command: "btrfs subvolume delete /mnt/d1/snapraid".to_string(),
            exit_status: Some(1),
            stderr: "ERROR: cannot delete\n".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("btrfs subvolume delete /mnt/d1/snapraid"));
        assert!(msg.contains("err=1"));
        assert!(msg.ends_with("ERROR: cannot delete"));
        assert_eq!(err.exit_status(), Some(1));
        assert!(err.is_command_failure());
    }

    #[test]
    fn test_spawn_failure_display() {
        let err = BridgeError::CommandFailed {
            command: "snapraid diff".to_string(),
            exit_status: None,
            stderr: String::new(),
        };

        assert!(err.to_string().contains("not started"));
        assert!(err.to_string().contains("no error output"));
        assert_eq!(err.exit_status(), None);
    }
}
