//! # Maintenance Orchestrator
//!
//! Drives a [`MaintenanceRun`] through its states, one external command at a
//! time.
//!
//! ## Workflow
//!
//! 1. **Touch**: fix zero sub-second timestamps on live data (optional)
//! 2. **Refresh**: replace every frozen subvolume with a clone of live
//! 3. **Diff**: compare the refreshed frozen data with the parity
//! 4. **Gate**: withhold the sync when too much was removed or updated
//! 5. **Sync**: update the parity
//! 6. **Rotate**: keep a read-only recovery snapshot of what was synced
//! 7. **Scrub**: verify part of the array (optional)
//!
//! Touch and refresh failures abort the run, as does a failed diff or sync.
//! Rotate and scrub failures only add warnings. The sync-only plan skips
//! touch, diff, gate and scrub.
//!
//! ## Usage
//!
//! ```ignore
//! use core_maintenance::MaintenanceOrchestrator;
//!
//! let orchestrator = MaintenanceOrchestrator::new(config, runner, fs)
//!     .with_event_bus(event_bus)
//!     .with_cancellation(token.clone());
//!
//! let run = orchestrator.run().await?;
//! std::process::exit(run.exit_code());
//! ```

use crate::gate::{allow_sync, GateDecision, ThresholdPolicy};
use crate::parity::ParityTool;
use crate::report::ChangeReport;
use crate::rotator::{RecoverySnapshot, SnapshotRotator};
use crate::run::{Disposition, MaintenanceRun, MaintenanceState, RunPlan, StepOutcome};
use crate::subvolume::SubvolumeManager;
use crate::volume::Volume;
use crate::{MaintenanceError, Result};
use bridge_traits::{Clock, CommandRunner, FileSystemAccess, SystemClock};
use core_runtime::config::MaintenanceConfig;
use core_runtime::events::{CoreEvent, EventBus, MaintenanceEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Result of executing one step.
enum StepResult {
    Continue {
        outcome: StepOutcome,
        detail: Option<String>,
        next: MaintenanceState,
    },
    GatedOut(GateDecision),
    Failed(MaintenanceError),
}

impl StepResult {
    fn succeeded(next: MaintenanceState) -> Self {
        StepResult::Continue {
            outcome: StepOutcome::Succeeded,
            detail: None,
            next,
        }
    }
}

pub struct MaintenanceOrchestrator {
    config: Arc<MaintenanceConfig>,
    volumes: Vec<Volume>,
    subvolumes: SubvolumeManager,
    rotator: SnapshotRotator,
    parity: ParityTool,
    policy: ThresholdPolicy,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    cancellation: CancellationToken,
}

impl MaintenanceOrchestrator {
    pub fn new(
        config: Arc<MaintenanceConfig>,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystemAccess>,
    ) -> Self {
        Self {
            volumes: Volume::from_config(&config),
            subvolumes: SubvolumeManager::new(Arc::clone(&runner), Arc::clone(&fs)),
            rotator: SnapshotRotator::new(Arc::clone(&runner), Arc::clone(&fs)),
            parity: ParityTool::new(runner, fs, Arc::clone(&config)),
            policy: ThresholdPolicy::from_config(&config),
            clock: Arc::new(SystemClock),
            event_bus: None,
            cancellation: CancellationToken::new(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Token checked between steps. Cancelling it ends the run as aborted
    /// before the next step starts; a running command is never interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// Runs the full maintenance plan.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<MaintenanceRun> {
        self.execute(RunPlan::Maintenance).await
    }

    /// Refreshes, syncs and rotates without touch, diff, gate or scrub.
    #[instrument(skip(self))]
    pub async fn run_sync(&self) -> Result<MaintenanceRun> {
        self.execute(RunPlan::SyncOnly).await
    }

    /// Runs `touch` on the live data only.
    #[instrument(skip(self))]
    pub async fn touch(&self) -> Result<()> {
        self.subvolumes.touch_live(&self.volumes, &self.parity).await
    }

    /// Diffs the live data against the parity without changing any subvolume.
    #[instrument(skip(self))]
    pub async fn diff_live(&self) -> Result<ChangeReport> {
        self.parity.diff_live(&self.volumes).await
    }

    /// Recovery snapshots on disk, per volume in configured order.
    pub async fn snapshots(&self) -> Result<Vec<(String, Vec<RecoverySnapshot>)>> {
        let mut all = Vec::with_capacity(self.volumes.len());
        for volume in &self.volumes {
            all.push((volume.name.clone(), self.rotator.list(volume).await?));
        }
        Ok(all)
    }

    /// Runs a plan to completion.
    ///
    /// Step failures end up in the run's disposition; only an internal error
    /// (an illegal state transition) is returned as `Err`.
    async fn execute(&self, plan: RunPlan) -> Result<MaintenanceRun> {
        let mut run = MaintenanceRun::new(plan, self.clock.now());
        let run_id = run.run_id.to_string();

        info!(
            run_id = %run_id,
            plan = plan.as_str(),
            volumes = self.volumes.len(),
            "Starting maintenance run"
        );
        self.emit(MaintenanceEvent::RunStarted {
            run_id: run_id.clone(),
            plan: plan.as_str().to_string(),
            volumes: self.volumes.iter().map(|v| v.name.clone()).collect(),
        });

        let mut next = match plan {
            RunPlan::Maintenance => MaintenanceState::Touch,
            RunPlan::SyncOnly => MaintenanceState::Refresh,
        };
        let mut diff_result: Option<Result<ChangeReport>> = None;

        loop {
            if !next.is_terminal() && self.cancellation.is_cancelled() {
                warn!("Cancellation requested before {}", next);
                self.abort(&mut run, next, MaintenanceError::Cancelled.to_string());
                return Ok(run);
            }

            run.transition(next)?;
            if next.is_terminal() {
                self.complete(&mut run);
                return Ok(run);
            }

            let state = next;
            let started_at = self.clock.now();
            self.emit(MaintenanceEvent::StepStarted {
                run_id: run_id.clone(),
                step: state.to_string(),
            });

            let result = match state {
                MaintenanceState::Touch => self.touch_step().await,
                MaintenanceState::Refresh => self.refresh_step(plan).await,
                MaintenanceState::Diff => {
                    let (result, report) = self.diff_step().await;
                    diff_result = report;
                    result
                }
                MaintenanceState::Gate => {
                    let report = diff_result.take().unwrap_or_else(|| {
                        Err(MaintenanceError::ReportFormat("no diff was run".to_string()))
                    });
                    run.report = report.as_ref().ok().copied();
                    self.gate_step(report.as_ref())
                }
                MaintenanceState::Sync => self.sync_step().await,
                MaintenanceState::Rotate => self.rotate_step(plan).await,
                MaintenanceState::Scrub => self.scrub_step().await,
                MaintenanceState::Start | MaintenanceState::Done => {
                    StepResult::succeeded(MaintenanceState::Done)
                }
            };
            let finished_at = self.clock.now();

            match result {
                StepResult::Continue {
                    outcome,
                    detail,
                    next: following,
                } => {
                    self.finish_step(&mut run, state, outcome, detail, started_at, finished_at);
                    if state == MaintenanceState::Rotate
                        && following == MaintenanceState::Done
                        && plan == RunPlan::Maintenance
                    {
                        self.finish_step(
                            &mut run,
                            MaintenanceState::Scrub,
                            StepOutcome::Skipped,
                            Some("no scrub plan configured".to_string()),
                            finished_at,
                            finished_at,
                        );
                    }
                    next = following;
                }
                StepResult::GatedOut(decision) => {
                    let reasons = decision.reason_strings();
                    self.finish_step(
                        &mut run,
                        state,
                        StepOutcome::Warning,
                        Some(reasons.join("; ")),
                        started_at,
                        finished_at,
                    );
                    self.gate_out(&mut run, decision);
                    return Ok(run);
                }
                StepResult::Failed(err) => {
                    let reason = err.to_string();
                    self.finish_step(
                        &mut run,
                        state,
                        StepOutcome::Failed,
                        Some(reason.clone()),
                        started_at,
                        finished_at,
                    );
                    self.abort(&mut run, state, reason);
                    return Ok(run);
                }
            }
        }
    }

    async fn touch_step(&self) -> StepResult {
        if !self.config.touch {
            info!("Touch disabled, skipping");
            return StepResult::Continue {
                outcome: StepOutcome::Skipped,
                detail: Some("touch disabled".to_string()),
                next: MaintenanceState::Refresh,
            };
        }

        info!("Phase: touch live data");
        match self.subvolumes.touch_live(&self.volumes, &self.parity).await {
            Ok(()) => StepResult::succeeded(MaintenanceState::Refresh),
            Err(err) => StepResult::Failed(err),
        }
    }

    async fn refresh_step(&self, plan: RunPlan) -> StepResult {
        info!("Phase: refresh frozen subvolumes");
        for volume in &self.volumes {
            if let Err(err) = self.subvolumes.refresh_frozen(volume).await {
                error!(volume = %volume.name, "Refresh failed: {}", err);
                return StepResult::Failed(err);
            }
        }

        StepResult::succeeded(match plan {
            RunPlan::Maintenance => MaintenanceState::Diff,
            RunPlan::SyncOnly => MaintenanceState::Sync,
        })
    }

    async fn diff_step(&self) -> (StepResult, Option<Result<ChangeReport>>) {
        info!("Phase: diff frozen data against parity");
        match self.parity.diff().await {
            Err(err) => (StepResult::Failed(err), None),
            Ok(Ok(report)) => {
                info!("Changes since last sync: {}", report);
                (
                    StepResult::Continue {
                        outcome: StepOutcome::Succeeded,
                        detail: Some(report.to_string()),
                        next: MaintenanceState::Gate,
                    },
                    Some(Ok(report)),
                )
            }
            Ok(Err(err)) => {
                warn!("Could not read the diff summary: {}", err);
                (
                    StepResult::Continue {
                        outcome: StepOutcome::Warning,
                        detail: Some(err.to_string()),
                        next: MaintenanceState::Gate,
                    },
                    Some(Err(err)),
                )
            }
        }
    }

    fn gate_step(&self, report: std::result::Result<&ChangeReport, &MaintenanceError>) -> StepResult {
        match allow_sync(report, &self.policy) {
            GateDecision::Allowed => StepResult::succeeded(MaintenanceState::Sync),
            blocked => StepResult::GatedOut(blocked),
        }
    }

    async fn sync_step(&self) -> StepResult {
        info!("Phase: sync parity");
        match self.parity.sync().await {
            Ok(()) => StepResult::succeeded(MaintenanceState::Rotate),
            Err(err) => StepResult::Failed(err),
        }
    }

    async fn rotate_step(&self, plan: RunPlan) -> StepResult {
        info!("Phase: rotate recovery snapshots");
        let keep = self.config.snapshots_to_keep;
        let mut problems = Vec::new();

        for volume in &self.volumes {
            if let Err(err) = self.rotator.snapshot_frozen(volume).await {
                warn!(volume = %volume.name, "Recovery snapshot failed: {}", err);
                problems.push(format!("{}: {}", volume.name, err));
                continue;
            }
            if let Err(err) = self.rotator.prune(volume, keep).await {
                warn!(volume = %volume.name, "Pruning recovery snapshots failed: {}", err);
                problems.push(format!("{}: {}", volume.name, err));
            }
        }

        let next = match (plan, self.config.scrub_plan) {
            (RunPlan::Maintenance, Some(_)) => MaintenanceState::Scrub,
            _ => MaintenanceState::Done,
        };
        if problems.is_empty() {
            StepResult::succeeded(next)
        } else {
            StepResult::Continue {
                outcome: StepOutcome::Warning,
                detail: Some(problems.join("; ")),
                next,
            }
        }
    }

    async fn scrub_step(&self) -> StepResult {
        info!("Phase: scrub");
        match self.parity.scrub().await {
            Ok(true) => StepResult::succeeded(MaintenanceState::Done),
            Ok(false) => StepResult::Continue {
                outcome: StepOutcome::Skipped,
                detail: Some("no scrub plan configured".to_string()),
                next: MaintenanceState::Done,
            },
            Err(err) => {
                warn!("Scrub failed: {}", err);
                StepResult::Continue {
                    outcome: StepOutcome::Warning,
                    detail: Some(err.to_string()),
                    next: MaintenanceState::Done,
                }
            }
        }
    }

    fn finish_step(
        &self,
        run: &mut MaintenanceRun,
        step: MaintenanceState,
        outcome: StepOutcome,
        detail: Option<String>,
        started_at: chrono::DateTime<chrono::Utc>,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) {
        self.emit(MaintenanceEvent::StepFinished {
            run_id: run.run_id.to_string(),
            step: step.to_string(),
            outcome: outcome.as_str().to_string(),
            detail: detail.clone(),
        });
        run.record(step, outcome, detail, started_at, finished_at);
    }

    fn gate_out(&self, run: &mut MaintenanceRun, decision: GateDecision) {
        let reasons = match decision {
            GateDecision::Blocked { reasons } => reasons,
            GateDecision::Allowed => Vec::new(),
        };
        let text: Vec<String> = reasons.iter().map(ToString::to_string).collect();

        match &run.report {
            Some(report) => warn!(
                removed = report.removed,
                updated = report.updated,
                removed_limit = ?self.policy.removed_limit,
                updated_limit = ?self.policy.updated_limit,
                "Sync withheld ({}). Run `snapraid sync` manually once the changes are confirmed",
                text.join(", ")
            ),
            None => warn!(
                "Sync withheld ({}). Run `snapraid sync` manually once the changes are confirmed",
                text.join(", ")
            ),
        }

        self.emit(MaintenanceEvent::GatedOut {
            run_id: run.run_id.to_string(),
            reasons: text,
        });
        run.finish(Disposition::GatedOut { reasons }, self.clock.now());
    }

    fn abort(&self, run: &mut MaintenanceRun, state: MaintenanceState, reason: String) {
        error!(state = %state, "Maintenance run aborted: {}", reason);
        self.emit(MaintenanceEvent::Aborted {
            run_id: run.run_id.to_string(),
            state: state.to_string(),
            reason: reason.clone(),
        });
        run.finish(Disposition::Aborted { state, reason }, self.clock.now());
    }

    fn complete(&self, run: &mut MaintenanceRun) {
        run.finish(Disposition::Completed, self.clock.now());
        let warnings = run.warnings();
        if warnings > 0 {
            warn!("Maintenance run completed with {} warning(s)", warnings);
        } else {
            info!("Maintenance run completed");
        }
        self.emit(MaintenanceEvent::Completed {
            run_id: run.run_id.to_string(),
            warnings,
            duration_secs: run.duration_secs(),
        });
    }

    fn emit(&self, event: MaintenanceEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Maintenance(event)).ok();
        }
    }
}
