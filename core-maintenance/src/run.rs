//! # Maintenance Run State Machine
//!
//! The record of one maintenance run and the table of legal state transitions.
//!
//! ## State Machine
//!
//! ```text
//! Start → Touch → Refresh → Diff → Gate → Sync → Rotate → Scrub → Done
//!   └──────────────↗          └───────────────↗       └──────────↗
//! ```
//!
//! The second row shows the shortcuts: touch disabled, the sync-only plan
//! (no diff and no gate), and no scrub plan. Any state may end the run as
//! [`Disposition::Aborted`]; a gated-out run is aborted at `Gate` and reported
//! as [`Disposition::GatedOut`].

use crate::gate::BlockReason;
use crate::report::ChangeReport;
use crate::{MaintenanceError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier of a maintenance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceState {
    Start,
    Touch,
    Refresh,
    Diff,
    Gate,
    Sync,
    Rotate,
    Scrub,
    Done,
}

impl MaintenanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceState::Start => "start",
            MaintenanceState::Touch => "touch",
            MaintenanceState::Refresh => "refresh",
            MaintenanceState::Diff => "diff",
            MaintenanceState::Gate => "gate",
            MaintenanceState::Sync => "sync",
            MaintenanceState::Rotate => "rotate",
            MaintenanceState::Scrub => "scrub",
            MaintenanceState::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MaintenanceState::Done)
    }

    /// Whether the run may move from `self` to `next`.
    pub fn can_transition_to(&self, next: MaintenanceState) -> bool {
        use MaintenanceState::*;
        matches!(
            (self, next),
            (Start, Touch)
                | (Start, Refresh)
                | (Touch, Refresh)
                | (Refresh, Diff)
                | (Refresh, Sync)
                | (Diff, Gate)
                | (Gate, Sync)
                | (Sync, Rotate)
                | (Rotate, Scrub)
                | (Rotate, Done)
                | (Scrub, Done)
        )
    }
}

impl FromStr for MaintenanceState {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(MaintenanceState::Start),
            "touch" => Ok(MaintenanceState::Touch),
            "refresh" => Ok(MaintenanceState::Refresh),
            "diff" => Ok(MaintenanceState::Diff),
            "gate" => Ok(MaintenanceState::Gate),
            "sync" => Ok(MaintenanceState::Sync),
            "rotate" => Ok(MaintenanceState::Rotate),
            "scrub" => Ok(MaintenanceState::Scrub),
            "done" => Ok(MaintenanceState::Done),
            _ => Err(MaintenanceError::Config(format!("Unknown maintenance state: {}", s))),
        }
    }
}

impl std::fmt::Display for MaintenanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which sequence of states a run follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPlan {
    /// Touch, refresh, diff, gate, sync, rotate, scrub.
    Maintenance,
    /// Refresh, sync, rotate. No gate.
    SyncOnly,
}

impl RunPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPlan::Maintenance => "maintenance",
            RunPlan::SyncOnly => "sync",
        }
    }
}

// ============================================================================
// Step Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Skipped,
    Warning,
    Failed,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Warning => "warning",
            StepOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: MaintenanceState,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    Completed,
    /// Sync withheld by the change gate. A normal outcome, not a failure.
    GatedOut { reasons: Vec<BlockReason> },
    Aborted {
        state: MaintenanceState,
        reason: String,
    },
}

impl Disposition {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Disposition::Completed => 0,
            Disposition::GatedOut { .. } => 3,
            Disposition::Aborted { .. } => 1,
        }
    }
}

// ============================================================================
// Run Record
// ============================================================================

/// Transient record of one run. Owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceRun {
    pub run_id: RunId,
    pub plan: RunPlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: MaintenanceState,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ChangeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
}

impl MaintenanceRun {
    pub fn new(plan: RunPlan, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: RunId::new(),
            plan,
            started_at,
            finished_at: None,
            state: MaintenanceState::Start,
            steps: Vec::new(),
            report: None,
            disposition: None,
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::InvalidStateTransition`] if the table does
    /// not allow it or the run has already finished.
    pub fn transition(&mut self, next: MaintenanceState) -> Result<()> {
        if self.disposition.is_some() {
            return Err(MaintenanceError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: "run has already finished".to_string(),
            });
        }
        if !self.state.can_transition_to(next) {
            return Err(MaintenanceError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: "transition not allowed".to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn record(
        &mut self,
        step: MaintenanceState,
        outcome: StepOutcome,
        detail: Option<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) {
        self.steps.push(StepRecord {
            step,
            outcome,
            detail,
            started_at,
            finished_at,
        });
    }

    pub fn finish(&mut self, disposition: Disposition, finished_at: DateTime<Utc>) {
        self.disposition = Some(disposition);
        self.finished_at = Some(finished_at);
    }

    /// Number of steps that ended with a warning.
    pub fn warnings(&self) -> u32 {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Warning)
            .count() as u32
    }

    pub fn step(&self, step: MaintenanceState) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Whether a step was started, whatever its outcome.
    pub fn attempted(&self, step: MaintenanceState) -> bool {
        self.steps
            .iter()
            .any(|s| s.step == step && s.outcome != StepOutcome::Skipped)
    }

    pub fn exit_code(&self) -> i32 {
        self.disposition.as_ref().map_or(1, Disposition::exit_code)
    }

    pub fn duration_secs(&self) -> u64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}
