//! # Parity Tool
//!
//! Typed wrapper around the SnapRAID executable. Every invocation has the
//! shape `<cmd> --conf <config> --quiet [args] <subcommand>`.
//!
//! `touch` and the standalone `diff` action must see the live data rather than
//! the frozen subvolumes. For those, a temporary configuration is written whose
//! `data` lines point at each volume's live subvolume; it is removed again once
//! the command has finished, whether or not it succeeded.

use crate::report::ChangeReport;
use crate::volume::Volume;
use crate::{MaintenanceError, Result};
use bridge_traits::{CommandOutput, CommandRunner, CommandSpec, FileSystemAccess};
use core_runtime::config::MaintenanceConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Exit codes `snapraid diff` uses for "no differences" and "differences found".
pub const DIFF_SUCCESS_CODES: &[i32] = &[0, 2];

const LIVE_CONFIG_PREFIX: &str = "snapraid-live-";

pub struct ParityTool {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystemAccess>,
    config: Arc<MaintenanceConfig>,
}

impl ParityTool {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystemAccess>,
        config: Arc<MaintenanceConfig>,
    ) -> Self {
        Self { runner, fs, config }
    }

    /// Builds the command line for a subcommand against `conf`.
    pub fn command(&self, conf: &Path, subcommand: &str, extra: &[String]) -> CommandSpec {
        CommandSpec::new(self.config.snapraid_command.to_string_lossy())
            .arg("--conf")
            .arg(conf.to_string_lossy())
            .arg("--quiet")
            .args(extra.iter().cloned())
            .arg(subcommand)
    }

    /// Runs `diff` against the configured (frozen) data and parses the summary.
    ///
    /// The outer result fails when the command itself fails; the inner one
    /// carries a report that could not be parsed, which the gate turns into a
    /// block rather than an abort.
    #[instrument(skip(self))]
    pub async fn diff(&self) -> Result<Result<ChangeReport>> {
        let output = self.run_diff(&self.config.snapraid_config).await?;
        Ok(ChangeReport::parse(&output.stdout))
    }

    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<()> {
        info!("Starting SnapRAID sync");
        let spec = self.command(&self.config.snapraid_config, "sync", &[]);
        self.runner.run(&spec).await?;
        info!("SnapRAID sync finished");
        Ok(())
    }

    /// Scrubs according to the configured plan. Does nothing without one.
    #[instrument(skip(self))]
    pub async fn scrub(&self) -> Result<bool> {
        let Some(plan) = self.config.scrub_plan else {
            debug!("No scrub plan configured");
            return Ok(false);
        };

        info!(plan = %plan, "Starting SnapRAID scrub");
        let args = plan.scrub_args(self.config.scrub_age_days);
        let spec = self.command(&self.config.snapraid_config, "scrub", &args);
        self.runner.run(&spec).await?;
        info!("SnapRAID scrub finished");
        Ok(true)
    }

    /// Runs `touch` on the live data of all volumes.
    #[instrument(skip(self, volumes))]
    pub async fn touch_live(&self, volumes: &[Volume]) -> Result<()> {
        info!("Starting SnapRAID touch on the live data");
        let conf = self.write_live_config(volumes).await?;
        let spec = self.command(&conf, "touch", &[]);
        let result = self.runner.run(&spec).await;
        self.remove_live_config(&conf).await;
        result?;
        Ok(())
    }

    /// Runs `diff` on the live data of all volumes.
    #[instrument(skip(self, volumes))]
    pub async fn diff_live(&self, volumes: &[Volume]) -> Result<ChangeReport> {
        let conf = self.write_live_config(volumes).await?;
        let result = self.run_diff(&conf).await;
        self.remove_live_config(&conf).await;
        ChangeReport::parse(&result?.stdout)
    }

    async fn run_diff(&self, conf: &Path) -> Result<CommandOutput> {
        info!("Starting SnapRAID diff");
        let spec = self
            .command(conf, "diff", &[])
            .success_codes(DIFF_SUCCESS_CODES)
            .read_only();
        Ok(self.runner.run(&spec).await?)
    }

    async fn write_live_config(&self, volumes: &[Volume]) -> Result<PathBuf> {
        let original = self
            .fs
            .read_to_string(&self.config.snapraid_config)
            .await
            .map_err(|e| {
                MaintenanceError::Config(format!(
                    "Cannot read SnapRAID configuration {}: {}",
                    self.config.snapraid_config.display(),
                    e
                ))
            })?;

        let text = live_config_text(&original, volumes)?;
        let path = self.fs.write_temp_file(LIVE_CONFIG_PREFIX, &text).await?;
        debug!(path = ?path, "Wrote temporary live-data SnapRAID configuration");
        Ok(path)
    }

    async fn remove_live_config(&self, path: &Path) {
        if let Err(e) = self.fs.delete_file(path).await {
            warn!(path = ?path, error = %e, "Failed to remove temporary SnapRAID configuration");
        }
    }
}

/// Rewrites a SnapRAID configuration so its `data` lines point at live data.
///
/// A `data` line is rewritten when its path is where SnapRAID normally sees a
/// volume (the secondary mount, or the frozen subvolume itself). Blank and
/// comment lines are dropped; every other line is kept as is. Each volume must
/// match exactly one `data` line.
pub fn live_config_text(original: &str, volumes: &[Volume]) -> Result<String> {
    let mut matched = vec![false; volumes.len()];
    let mut out = String::with_capacity(original.len());

    for line in original.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        if let (Some("data"), Some(disk), Some(path)) = (fields.next(), fields.next(), fields.next())
        {
            let path = Path::new(path.trim_end_matches('/'));
            if let Some(idx) = volumes
                .iter()
                .position(|v| v.parity_view() == path || v.frozen_path() == path)
            {
                if matched[idx] {
                    return Err(MaintenanceError::Config(format!(
                        "Volume {} has more than one data line in the SnapRAID configuration",
                        volumes[idx].name
                    )));
                }
                matched[idx] = true;
                out.push_str(&format!(
                    "data {} {}\n",
                    disk,
                    volumes[idx].live_path().display()
                ));
                continue;
            }
        }

        out.push_str(line);
        out.push('\n');
    }

    let missing: Vec<&str> = volumes
        .iter()
        .zip(&matched)
        .filter(|(_, found)| !**found)
        .map(|(v, _)| v.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(MaintenanceError::Config(format!(
            "No SnapRAID data line for volume(s): {}",
            missing.join(", ")
        )));
    }

    Ok(out)
}
