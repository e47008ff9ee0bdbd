use bridge_traits::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("Command \"{command}\" failed ({}): {}", describe_exit(.exit_status), .stderr.trim())]
    ExternalCommand {
        command: String,
        exit_status: Option<i32>,
        stderr: String,
    },

    #[error("Subvolume not found on volume {volume}: {}", .path.display())]
    SubvolumeNotFound { volume: String, path: PathBuf },

    #[error("Frozen subvolume missing on volume {volume} ({}) after failed refresh: {cause}", .path.display())]
    FrozenMissing {
        volume: String,
        path: PathBuf,
        cause: String,
    },

    #[error("Unrecognized change report: {0}")]
    ReportFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Maintenance run cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error(transparent)]
    Bridge(BridgeError),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

impl MaintenanceError {
    /// Exit status of the external command behind this error, if any.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            MaintenanceError::ExternalCommand { exit_status, .. } => *exit_status,
            _ => None,
        }
    }
}

impl From<BridgeError> for MaintenanceError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::CommandFailed {
                command,
                exit_status,
                stderr,
            } => MaintenanceError::ExternalCommand {
                command,
                exit_status,
                stderr,
            },
            other => MaintenanceError::Bridge(other),
        }
    }
}

fn describe_exit(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "did not run to completion".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, MaintenanceError>;
