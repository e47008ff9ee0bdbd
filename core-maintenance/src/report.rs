//! # Change Report Parser
//!
//! Turns the summary printed by `snapraid diff` into a [`ChangeReport`].
//!
//! The summary is a block of lines such as:
//!
//! ```text
//!   120505 equal
//!       12 added
//!        3 removed
//!        1 updated
//!        0 moved
//!        0 copied
//!        0 restored
//! There are differences!
//! ```
//!
//! Lines are scanned from the bottom up, so a file name that happens to look
//! like a summary line earlier in the listing never wins over the real
//! summary.

use crate::{MaintenanceError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+(equal|added|removed|updated|moved|copied|restored)\s*$")
        .expect("summary line regex is valid")
});

/// Counts of differences between the parity data and the frozen data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
    pub moved: u64,
    pub copied: u64,
    pub equal: u64,
    pub restored: u64,
}

impl ChangeReport {
    /// Parses the diff output.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::ReportFormat`] when the `removed` or
    /// `updated` count is missing, since the gate cannot decide without them.
    pub fn parse(output: &str) -> Result<Self> {
        let mut counts: [Option<u64>; 7] = [None; 7];

        for line in output.lines().rev() {
            let Some(caps) = SUMMARY_LINE.captures(line) else {
                continue;
            };
            let Ok(count) = caps[1].parse::<u64>() else {
                continue;
            };
            let slot = match &caps[2] {
                "added" => 0,
                "removed" => 1,
                "updated" => 2,
                "moved" => 3,
                "copied" => 4,
                "equal" => 5,
                _ => 6,
            };
            if counts[slot].is_none() {
                counts[slot] = Some(count);
            }
        }

        let missing: Vec<&str> = [(1, "removed"), (2, "updated")]
            .iter()
            .filter(|(slot, _)| counts[*slot].is_none())
            .map(|(_, label)| *label)
            .collect();
        if !missing.is_empty() {
            return Err(MaintenanceError::ReportFormat(format!(
                "no '{}' count in diff output",
                missing.join("', '")
            )));
        }

        Ok(ChangeReport {
            added: counts[0].unwrap_or(0),
            removed: counts[1].unwrap_or(0),
            updated: counts[2].unwrap_or(0),
            moved: counts[3].unwrap_or(0),
            copied: counts[4].unwrap_or(0),
            equal: counts[5].unwrap_or(0),
            restored: counts[6].unwrap_or(0),
        })
    }

    /// True when nothing was added, removed, updated, moved or copied.
    pub fn is_empty(&self) -> bool {
        self.added == 0
            && self.removed == 0
            && self.updated == 0
            && self.moved == 0
            && self.copied == 0
    }
}

impl std::fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} updated, {} moved, {} copied",
            self.added, self.removed, self.updated, self.moved, self.copied
        )
    }
}
