//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - Pretty, compact and JSON console output
//! - An optional append-only log file, rotated by size at startup
//! - Separate levels for console and file
//! - The `output` level: `info` for the tool plus the captured output of the
//!   external commands it runs (logged under the `command_output` target)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::time::LogLevel;
//! use core_runtime::logging::{init_logging, LogFileConfig, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_level(LogLevel::Output)
//!     .with_file(LogFileConfig::new("/var/log/btrfs-snapraid.log").with_level(LogLevel::Debug));
//!
//! init_logging(config)?;
//! tracing::info!("Maintenance started");
//! ```

use crate::error::{Error, Result};
use bridge_traits::process::COMMAND_OUTPUT_TARGET;
use bridge_traits::time::LogLevel;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{
    filter::EnvFilter, fmt::writer::BoxMakeWriter, layer::SubscriberExt, registry::Registry,
    util::SubscriberInitExt, Layer,
};

/// Log files larger than this are rotated at startup.
pub const DEFAULT_MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Number of rotated log files kept (`file.1` … `file.N`).
pub const DEFAULT_LOG_BACKUPS: usize = 9;

/// Crates whose events are shown at the configured level; everything else is
/// held at `warn`.
const OWN_TARGETS: &[&str] = &[
    "btrfs_snapraid",
    "core_maintenance",
    "core_runtime",
    "bridge_desktop",
    "bridge_traits",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// One line per event
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Log file settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileConfig {
    pub path: PathBuf,
    pub level: LogLevel,
    pub max_bytes: u64,
    pub backups: usize,
}

impl LogFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            level: LogLevel::Info,
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            backups: DEFAULT_LOG_BACKUPS,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Console output format
    pub format: LogFormat,
    /// Console level
    pub level: LogLevel,
    /// Custom console filter string; replaces the one derived from `level`
    pub filter: Option<String>,
    /// Optional log file
    pub file: Option<LogFileConfig>,
    /// Display target module in logs
    pub display_target: bool,
    /// Write console logs to stderr instead of stdout
    pub use_stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            file: None,
            display_target: false,
            use_stderr: false,
        }
    }
}

impl LoggingConfig {
    /// Set console format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set console level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set custom filter string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable the log file
    pub fn with_file(mut self, file: LogFileConfig) -> Self {
        self.file = Some(file);
        self
    }

    /// Enable or disable target display
    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    /// Keep stdout free for machine-readable output
    pub fn with_stderr(mut self, use_stderr: bool) -> Self {
        self.use_stderr = use_stderr;
        self
    }
}

/// Initialize the logging system
///
/// This should be called once during application startup. Subsequent calls
/// will return an error.
///
/// # Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - The filter string is invalid
/// - The log file cannot be rotated or opened
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter = match &config.filter {
        Some(custom) => EnvFilter::try_new(custom)
            .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))?,
        None => build_filter(config.level)?,
    };
    layers.push(console_layer(&config, console_filter));

    if let Some(file_config) = &config.file {
        let file = open_log_file(file_config)?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(config.display_target)
            .with_writer(Mutex::new(file))
            .with_filter(build_filter(file_config.level)?)
            .boxed();
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

fn console_layer(
    config: &LoggingConfig,
    filter: EnvFilter,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    let writer = if config.use_stderr {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::stdout)
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.display_target)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(config.display_target)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(config.display_target)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

/// Filter directives for `level`: our crates at that level, command output
/// per the `output` rules, everything else at `warn`.
fn filter_directives(level: LogLevel) -> String {
    let (own, command_output) = match level {
        LogLevel::Trace => ("trace", "trace"),
        LogLevel::Debug => ("debug", "debug"),
        LogLevel::Output => ("info", "debug"),
        LogLevel::Info => ("info", "info"),
        LogLevel::Warn => ("warn", "warn"),
        LogLevel::Error => ("error", "error"),
    };

    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{}={}", target, own)));
    directives.push(format!("{}={}", COMMAND_OUTPUT_TARGET, command_output));
    directives.join(",")
}

fn build_filter(level: LogLevel) -> Result<EnvFilter> {
    EnvFilter::try_new(filter_directives(level))
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn open_log_file(config: &LogFileConfig) -> Result<File> {
    rotate_log_file(&config.path, config.max_bytes, config.backups).map_err(|e| {
        Error::Config(format!(
            "Cannot rotate log file {}: {}",
            config.path.display(),
            e
        ))
    })?;

    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)
        .map_err(|e| {
            Error::Config(format!(
                "Cannot open log file {}: {}",
                config.path.display(),
                e
            ))
        })
}

/// Rotate `path` if it is at least `max_bytes` long: `path.N-1` moves to
/// `path.N` (the oldest is dropped), and `path` becomes `path.1`.
///
/// Returns whether a rotation happened. With `backups == 0` an oversized
/// file is truncated by removal.
pub fn rotate_log_file(path: &Path, max_bytes: u64, backups: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes {
        return Ok(false);
    }

    if backups == 0 {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let backup = |n: usize| {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    };

    let oldest = backup(backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            fs::rename(&from, backup(n + 1))?;
        }
    }
    fs::rename(path, backup(1))?;

    Ok(true)
}
