//! # Maintenance Configuration
//!
//! Configuration model for the btrfs + SnapRAID maintenance tool.
//!
//! ## Overview
//!
//! Configuration is read from a TOML file into a statically shaped record
//! (unknown keys are rejected), then turned into an immutable
//! [`MaintenanceConfig`] through [`MaintenanceConfigBuilder`]. All validation
//! happens in [`MaintenanceConfig::validate`], before any command runs.
//!
//! ## File Format
//!
//! ```toml
//! [mounts]
//! btrfs_mount_dir = "/mnt/btrfs-roots"
//! drives = ["d1", "d2", "d3"]
//! snapraid_mount_dir = "/mnt/snapraid"
//!
//! [subvolumes]
//! live_data = "data"
//! snapraid_data = "snapraid"
//! snapraid_snaps_to_keep = 3
//!
//! [snapraid]
//! cmd = "/usr/bin/snapraid"
//! config = "/etc/snapraid.conf"
//!
//! [snapraid_maintenance]
//! delete_threshold = 50
//! update_threshold = 100
//! scrub_plan = "new"
//! ```
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::MaintenanceConfig;
//!
//! let config = MaintenanceConfig::builder()
//!     .btrfs_mount_dir("/mnt/btrfs-roots")
//!     .drives(["d1", "d2"])
//!     .live_subvolume("data")
//!     .frozen_subvolume("snapraid")
//!     .snapraid_command("/usr/bin/snapraid")
//!     .snapraid_config("/etc/snapraid.conf")
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(config.snapshots_to_keep, 1);
//! assert!(config.touch);
//! ```
//!
//! ## Error Handling
//!
//! The builder reports the first missing or invalid setting:
//!
//! ```should_panic
//! use core_runtime::config::MaintenanceConfig;
//!
//! let config = MaintenanceConfig::builder()
//!     .btrfs_mount_dir("/mnt/btrfs-roots")
//!     .build()
//!     .expect("Should fail - subvolumes and snapraid settings missing");
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Name of the configuration file looked up in the search path.
pub const CONFIG_FILE_NAME: &str = "btrfs_snapraid.toml";

/// Directories searched, in order, when no configuration path is given.
pub const CONFIG_SEARCH_DIRS: &[&str] = &[".", "/usr/local/etc", "/etc"];

/// Default age in days for percentage scrub plans.
pub const DEFAULT_SCRUB_AGE_DAYS: u32 = 10;

// ============================================================================
// Configuration Model
// ============================================================================

/// Immutable, validated configuration for one array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceConfig {
    /// Directory under which each drive's btrfs root is mounted (`<dir>/<drive>`).
    pub btrfs_mount_dir: PathBuf,

    /// Drive names, in processing order.
    pub drives: Vec<String>,

    /// Directory under which each drive's frozen subvolume is separately
    /// mounted for SnapRAID, if it is.
    pub snapraid_mount_dir: Option<PathBuf>,

    /// Name of the live (read-write) subvolume.
    pub live_subvolume: String,

    /// Name of the frozen subvolume SnapRAID reads.
    pub frozen_subvolume: String,

    /// Relative directory holding the frozen subvolume (empty for the volume root).
    pub snapraid_subdir: PathBuf,

    /// Number of recovery snapshots to keep per volume (at least 1).
    pub snapshots_to_keep: usize,

    /// SnapRAID executable.
    pub snapraid_command: PathBuf,

    /// SnapRAID configuration file.
    pub snapraid_config: PathBuf,

    /// Maximum removed files before sync is withheld.
    pub delete_threshold: Option<u64>,

    /// Maximum updated files before sync is withheld.
    pub update_threshold: Option<u64>,

    /// Run `snapraid touch` on the live data before refreshing.
    pub touch: bool,

    /// Scrub plan; `None` disables scrubbing.
    pub scrub_plan: Option<ScrubPlan>,

    /// `--older-than` argument for percentage scrub plans.
    pub scrub_age_days: u32,

    /// Log levels and log file.
    pub logging: LogSettings,

    /// Run lock file, if configured explicitly.
    pub lock_file: Option<PathBuf>,
}

/// Logging settings carried by the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSettings {
    pub console_level: LogLevel,
    pub file: Option<PathBuf>,
    pub file_level: LogLevel,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: LogLevel::Info,
            file: None,
            file_level: LogLevel::Info,
        }
    }
}

/// SnapRAID scrub plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrubPlan {
    /// Scrub blocks marked bad.
    Bad,
    /// Scrub blocks synced but never scrubbed.
    New,
    /// Scrub everything.
    Full,
    /// Scrub this percentage of the array, oldest first.
    Percent(u8),
}

impl ScrubPlan {
    /// Arguments passed to `snapraid scrub` for this plan.
    pub fn scrub_args(&self, older_than_days: u32) -> Vec<String> {
        match self {
            ScrubPlan::Percent(pct) => vec![
                "--plan".to_string(),
                pct.to_string(),
                "--older-than".to_string(),
                older_than_days.to_string(),
            ],
            other => vec!["--plan".to_string(), other.to_string()],
        }
    }

    fn percent(pct: u64) -> Result<Self> {
        if pct > 100 {
            return Err(Error::Config(format!(
                "Scrub plan percentage {} exceeds 100",
                pct
            )));
        }
        Ok(ScrubPlan::Percent(pct as u8))
    }
}

impl fmt::Display for ScrubPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrubPlan::Bad => f.write_str("bad"),
            ScrubPlan::New => f.write_str("new"),
            ScrubPlan::Full => f.write_str("full"),
            ScrubPlan::Percent(pct) => write!(f, "{}", pct),
        }
    }
}

impl FromStr for ScrubPlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "bad" => Ok(ScrubPlan::Bad),
            "new" => Ok(ScrubPlan::New),
            "full" => Ok(ScrubPlan::Full),
            _ if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
                let pct: u64 = s
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid scrub plan: {}", s)))?;
                ScrubPlan::percent(pct)
            }
            _ => Err(Error::Config(format!(
                "Invalid scrub plan '{}': expected bad, new, full or a percentage 0-100",
                s
            ))),
        }
    }
}

impl MaintenanceConfig {
    /// Creates a new builder for constructing a `MaintenanceConfig`.
    pub fn builder() -> MaintenanceConfigBuilder {
        MaintenanceConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid configuration file: {}", e)))?;
        file.into_builder()?.build()
    }

    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read configuration file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `explicit` if given, otherwise the first configuration file found
    /// in [`CONFIG_SEARCH_DIRS`]. Returns the path that was used.
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Self)> {
        if let Some(path) = explicit {
            return Ok((path.to_path_buf(), Self::load(path)?));
        }

        let candidates = search_paths();
        for candidate in &candidates {
            if candidate.is_file() {
                return Ok((candidate.clone(), Self::load(candidate)?));
            }
        }

        Err(Error::ConfigNotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Run lock path: the configured one, or one derived from the
    /// configuration file name in the system temp directory.
    pub fn lock_path(&self, config_path: &Path) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| default_lock_path(config_path))
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Mount directories and the SnapRAID config are absolute paths
    /// - At least one drive, with unique plain names
    /// - Subvolume names are plain, non-empty and distinct
    /// - The SnapRAID subdirectory is relative and stays inside the volume
    /// - At least one snapshot is kept
    pub fn validate(&self) -> Result<()> {
        require_absolute("mounts.btrfs_mount_dir", &self.btrfs_mount_dir)?;
        if let Some(dir) = &self.snapraid_mount_dir {
            require_absolute("mounts.snapraid_mount_dir", dir)?;
        }

        if self.drives.is_empty() {
            return Err(Error::Config(
                "At least one drive must be listed in mounts.drives".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for drive in &self.drives {
            require_plain_name("mounts.drives", drive)?;
            if !seen.insert(drive.as_str()) {
                return Err(Error::Config(format!("Drive '{}' is listed twice", drive)));
            }
        }

        require_plain_name("subvolumes.live_data", &self.live_subvolume)?;
        require_plain_name("subvolumes.snapraid_data", &self.frozen_subvolume)?;
        if self.snapraid_subdir.as_os_str().is_empty() && self.live_subvolume == self.frozen_subvolume {
            return Err(Error::Config(
                "subvolumes.live_data and subvolumes.snapraid_data must differ".to_string(),
            ));
        }

        if self.snapraid_subdir.is_absolute()
            || self
                .snapraid_subdir
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Config(format!(
                "subvolumes.snapraid_subdir must be a relative path inside the volume, got {}",
                self.snapraid_subdir.display()
            )));
        }

        if self.snapshots_to_keep == 0 {
            return Err(Error::Config(
                "Snapshots to keep must be at least 1".to_string(),
            ));
        }

        if self.snapraid_command.as_os_str().is_empty() {
            return Err(Error::Config("snapraid.cmd cannot be empty".to_string()));
        }
        require_absolute("snapraid.config", &self.snapraid_config)?;

        if let Some(lock_file) = &self.lock_file {
            require_absolute("runtime.lock_file", lock_file)?;
        }

        Ok(())
    }
}

fn require_absolute(key: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", key)));
    }
    if !path.is_absolute() {
        return Err(Error::Config(format!(
            "{} must be an absolute path, got {}",
            key,
            path.display()
        )));
    }
    Ok(())
}

fn require_plain_name(key: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", key)));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(Error::Config(format!(
            "{} must be a plain name, got '{}'",
            key, name
        )));
    }
    Ok(())
}

fn search_paths() -> Vec<PathBuf> {
    CONFIG_SEARCH_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(CONFIG_FILE_NAME))
        .collect()
}

/// `<temp dir>/btrfs-snapraid-<config file stem>.lock`
pub fn default_lock_path(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string());
    std::env::temp_dir().join(format!("btrfs-snapraid-{}.lock", stem))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`MaintenanceConfig`].
#[derive(Debug, Default, Clone)]
pub struct MaintenanceConfigBuilder {
    btrfs_mount_dir: Option<PathBuf>,
    drives: Vec<String>,
    snapraid_mount_dir: Option<PathBuf>,
    live_subvolume: Option<String>,
    frozen_subvolume: Option<String>,
    snapraid_subdir: Option<PathBuf>,
    snapshots_to_keep: Option<i64>,
    snapraid_command: Option<PathBuf>,
    snapraid_config: Option<PathBuf>,
    delete_threshold: Option<u64>,
    update_threshold: Option<u64>,
    touch: Option<bool>,
    scrub_plan: Option<ScrubPlan>,
    scrub_age_days: Option<u32>,
    logging: Option<LogSettings>,
    lock_file: Option<PathBuf>,
}

impl MaintenanceConfigBuilder {
    pub fn btrfs_mount_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.btrfs_mount_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn drives<I, S>(mut self, drives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drives = drives.into_iter().map(Into::into).collect();
        self
    }

    pub fn snapraid_mount_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.snapraid_mount_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn live_subvolume(mut self, name: impl Into<String>) -> Self {
        self.live_subvolume = Some(name.into());
        self
    }

    pub fn frozen_subvolume(mut self, name: impl Into<String>) -> Self {
        self.frozen_subvolume = Some(name.into());
        self
    }

    pub fn snapraid_subdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.snapraid_subdir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Values below 1 are clamped to 1 with a warning.
    pub fn snapshots_to_keep(mut self, keep: i64) -> Self {
        self.snapshots_to_keep = Some(keep);
        self
    }

    pub fn snapraid_command(mut self, cmd: impl AsRef<Path>) -> Self {
        self.snapraid_command = Some(cmd.as_ref().to_path_buf());
        self
    }

    pub fn snapraid_config(mut self, path: impl AsRef<Path>) -> Self {
        self.snapraid_config = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn delete_threshold(mut self, limit: u64) -> Self {
        self.delete_threshold = Some(limit);
        self
    }

    pub fn update_threshold(mut self, limit: u64) -> Self {
        self.update_threshold = Some(limit);
        self
    }

    pub fn touch(mut self, enabled: bool) -> Self {
        self.touch = Some(enabled);
        self
    }

    pub fn scrub_plan(mut self, plan: ScrubPlan) -> Self {
        self.scrub_plan = Some(plan);
        self
    }

    pub fn scrub_age_days(mut self, days: u32) -> Self {
        self.scrub_age_days = Some(days);
        self
    }

    pub fn logging(mut self, logging: LogSettings) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn lock_file(mut self, path: impl AsRef<Path>) -> Self {
        self.lock_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds and validates the final `MaintenanceConfig`.
    pub fn build(self) -> Result<MaintenanceConfig> {
        let btrfs_mount_dir = self.btrfs_mount_dir.ok_or_else(|| {
            Error::Config("mounts.btrfs_mount_dir is required".to_string())
        })?;

        let live_subvolume = self.live_subvolume.ok_or_else(|| {
            Error::Config("subvolumes.live_data is required".to_string())
        })?;

        let frozen_subvolume = self.frozen_subvolume.ok_or_else(|| {
            Error::Config("subvolumes.snapraid_data is required".to_string())
        })?;

        let snapraid_command = self
            .snapraid_command
            .ok_or_else(|| Error::Config("snapraid.cmd is required".to_string()))?;

        let snapraid_config = self
            .snapraid_config
            .ok_or_else(|| Error::Config("snapraid.config is required".to_string()))?;

        let snapshots_to_keep = match self.snapshots_to_keep {
            None => 1,
            Some(keep) if keep < 1 => {
                warn!(
                    configured = keep,
                    "snapraid_snaps_to_keep must be at least 1; keeping 1 snapshot"
                );
                1
            }
            Some(keep) => keep as usize,
        };

        let config = MaintenanceConfig {
            btrfs_mount_dir,
            drives: self.drives,
            snapraid_mount_dir: self.snapraid_mount_dir,
            live_subvolume,
            frozen_subvolume,
            snapraid_subdir: self.snapraid_subdir.unwrap_or_default(),
            snapshots_to_keep,
            snapraid_command,
            snapraid_config,
            delete_threshold: self.delete_threshold,
            update_threshold: self.update_threshold,
            touch: self.touch.unwrap_or(true),
            scrub_plan: self.scrub_plan,
            scrub_age_days: self.scrub_age_days.unwrap_or(DEFAULT_SCRUB_AGE_DAYS),
            logging: self.logging.unwrap_or_default(),
            lock_file: self.lock_file,
        };

        config.validate()?;

        Ok(config)
    }
}

// ============================================================================
// TOML File Shape
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    mounts: MountsSection,
    subvolumes: SubvolumesSection,
    snapraid: SnapraidSection,
    #[serde(default)]
    snapraid_maintenance: MaintenanceSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    runtime: RuntimeSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MountsSection {
    btrfs_mount_dir: PathBuf,
    drives: Vec<String>,
    snapraid_mount_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubvolumesSection {
    live_data: String,
    snapraid_data: String,
    snapraid_subdir: Option<PathBuf>,
    snapraid_snaps_to_keep: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapraidSection {
    cmd: PathBuf,
    config: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaintenanceSection {
    delete_threshold: Option<u64>,
    update_threshold: Option<u64>,
    touch: Option<bool>,
    scrub_plan: Option<RawScrubPlan>,
    scrub_age: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScrubPlan {
    Number(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    console_level: Option<String>,
    file: Option<PathBuf>,
    file_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuntimeSection {
    lock_file: Option<PathBuf>,
}

fn parse_level(key: &str, value: Option<String>, default: LogLevel) -> Result<LogLevel> {
    match value {
        None => Ok(default),
        Some(text) => text
            .parse()
            .map_err(|e: String| Error::Config(format!("{}: {}", key, e))),
    }
}

impl ConfigFile {
    fn into_builder(self) -> Result<MaintenanceConfigBuilder> {
        let mut builder = MaintenanceConfig::builder()
            .btrfs_mount_dir(&self.mounts.btrfs_mount_dir)
            .drives(self.mounts.drives)
            .live_subvolume(self.subvolumes.live_data)
            .frozen_subvolume(self.subvolumes.snapraid_data)
            .snapraid_command(&self.snapraid.cmd)
            .snapraid_config(&self.snapraid.config);

        if let Some(dir) = &self.mounts.snapraid_mount_dir {
            builder = builder.snapraid_mount_dir(dir);
        }
        if let Some(subdir) = &self.subvolumes.snapraid_subdir {
            builder = builder.snapraid_subdir(subdir);
        }
        if let Some(keep) = self.subvolumes.snapraid_snaps_to_keep {
            builder = builder.snapshots_to_keep(keep);
        }

        let maintenance = self.snapraid_maintenance;
        if let Some(limit) = maintenance.delete_threshold {
            builder = builder.delete_threshold(limit);
        }
        if let Some(limit) = maintenance.update_threshold {
            builder = builder.update_threshold(limit);
        }
        if let Some(touch) = maintenance.touch {
            builder = builder.touch(touch);
        }
        if let Some(plan) = maintenance.scrub_plan {
            let plan = match plan {
                RawScrubPlan::Number(pct) => ScrubPlan::percent(pct)?,
                RawScrubPlan::Text(text) => text.parse()?,
            };
            builder = builder.scrub_plan(plan);
        }
        if let Some(age) = maintenance.scrub_age {
            builder = builder.scrub_age_days(age);
        }

        let logging = LogSettings {
            console_level: parse_level("logging.console_level", self.logging.console_level, LogLevel::Info)?,
            file: self.logging.file,
            file_level: parse_level("logging.file_level", self.logging.file_level, LogLevel::Info)?,
        };
        builder = builder.logging(logging);

        if let Some(lock_file) = &self.runtime.lock_file {
            builder = builder.lock_file(lock_file);
        }

        Ok(builder)
    }
}
