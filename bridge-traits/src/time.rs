//! Time and Log Level Abstractions
//!
//! Provides an injectable time source for deterministic run records, and the
//! log level vocabulary shared by configuration and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where run records get their timestamps from.
///
/// Production uses [`SystemClock`]; tests substitute a fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Log level
///
/// Ordered from most to least verbose. `Output` sits between `Debug` and
/// `Info`: it is `Info` for the tool itself plus the captured output of the
/// external commands it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Output,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Output => "output",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// The more verbose of two levels.
    pub fn most_verbose(self, other: LogLevel) -> LogLevel {
        self.min(other)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "output" => Ok(LogLevel::Output),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let first = SystemClock.now();
        let second = SystemClock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Output);
        assert!(LogLevel::Output < LogLevel::Info);
        assert_eq!(LogLevel::Info.most_verbose(LogLevel::Output), LogLevel::Output);
        assert_eq!(LogLevel::Debug.most_verbose(LogLevel::Output), LogLevel::Debug);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("OUTPUT".parse::<LogLevel>().unwrap(), LogLevel::Output);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" info ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_round_trips_display() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Output,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }
}
