//! # Maintenance Module
//!
//! Keeps a SnapRAID array whose data disks are btrfs volumes in a consistent
//! state.
//!
//! SnapRAID never reads the live, read-write subvolume of a disk. It reads a
//! frozen clone that is replaced wholesale before every sync, so files keep
//! changing under the live path without disturbing parity computation. After
//! each successful sync a read-only recovery snapshot of the frozen clone is
//! kept, so the data the parity describes stays restorable.
//!
//! ## Components
//!
//! - **Volumes** (`volume`): where each drive's subvolumes live
//! - **Subvolume Manager** (`subvolume`): frozen refresh and live touch
//! - **Snapshot Rotator** (`rotator`): recovery snapshot creation and pruning
//! - **Change Report** (`report`): parsing of the `snapraid diff` summary
//! - **Threshold Gate** (`gate`): withholds sync on excessive change
//! - **Parity Tool** (`parity`): typed SnapRAID invocations
//! - **Run Record** (`run`): state machine and per-step outcomes
//! - **Orchestrator** (`orchestrator`): drives a run from start to finish

pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod parity;
pub mod report;
pub mod rotator;
pub mod run;
pub mod subvolume;
pub mod volume;

#[cfg(test)]
mod test_support;

pub use error::{MaintenanceError, Result};
pub use gate::{allow_sync, BlockReason, GateDecision, ThresholdPolicy};
pub use orchestrator::MaintenanceOrchestrator;
pub use parity::{live_config_text, ParityTool};
pub use report::ChangeReport;
pub use rotator::{RecoverySnapshot, SnapshotRotator};
pub use run::{
    Disposition, MaintenanceRun, MaintenanceState, RunId, RunPlan, StepOutcome, StepRecord,
};
pub use subvolume::SubvolumeManager;
pub use volume::Volume;
