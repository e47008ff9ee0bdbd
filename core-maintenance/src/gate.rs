//! # Threshold Gate
//!
//! Decides whether a sync may run given the change report. Pure function, no
//! side effects: a blocked sync is reported, never retried.

use crate::report::ChangeReport;
use crate::MaintenanceError;
use core_runtime::config::MaintenanceConfig;
use serde::Serialize;
use std::fmt;

/// Optional ceilings on the number of removed and updated files.
///
/// `None` means no limit. `Some(0)` is a real limit: any change blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThresholdPolicy {
    pub removed_limit: Option<u64>,
    pub updated_limit: Option<u64>,
}

impl ThresholdPolicy {
    pub fn new(removed_limit: Option<u64>, updated_limit: Option<u64>) -> Self {
        Self {
            removed_limit,
            updated_limit,
        }
    }

    pub fn from_config(config: &MaintenanceConfig) -> Self {
        Self::new(config.delete_threshold, config.update_threshold)
    }
}

/// Why a sync was withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    Removed { count: u64, limit: u64 },
    Updated { count: u64, limit: u64 },
    ReportUnavailable { detail: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Removed { count, limit } => write!(f, "removed: {} > {}", count, limit),
            BlockReason::Updated { count, limit } => write!(f, "updated: {} > {}", count, limit),
            BlockReason::ReportUnavailable { detail } => {
                write!(f, "report_unavailable: {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    Blocked { reasons: Vec<BlockReason> },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    /// Reasons rendered as text, empty when allowed.
    pub fn reason_strings(&self) -> Vec<String> {
        match self {
            GateDecision::Allowed => Vec::new(),
            GateDecision::Blocked { reasons } => reasons.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Decides whether sync may run.
///
/// Blocked when the report could not be produced, or when a configured limit
/// is strictly exceeded. Both limits are checked so every exceeded limit is
/// reported.
pub fn allow_sync(
    report: std::result::Result<&ChangeReport, &MaintenanceError>,
    policy: &ThresholdPolicy,
) -> GateDecision {
    let report = match report {
        Ok(report) => report,
        Err(err) => {
            return GateDecision::Blocked {
                reasons: vec![BlockReason::ReportUnavailable {
                    detail: err.to_string(),
                }],
            }
        }
    };

    let mut reasons = Vec::new();
    if let Some(limit) = policy.removed_limit {
        if report.removed > limit {
            reasons.push(BlockReason::Removed {
                count: report.removed,
                limit,
            });
        }
    }
    if let Some(limit) = policy.updated_limit {
        if report.updated > limit {
            reasons.push(BlockReason::Updated {
                count: report.updated,
                limit,
            });
        }
    }

    if reasons.is_empty() {
        GateDecision::Allowed
    } else {
        GateDecision::Blocked { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(removed: u64, updated: u64) -> ChangeReport {
        ChangeReport {
            removed,
            updated,
            ..Default::default()
        }
    }

    #[test]
    fn test_case_table() {
        // (removed_limit, updated_limit, removed, updated, allowed)
        let cases = [
            (None, None, 10_000, 10_000, true),
            (Some(50), None, 50, 999, true),
            (Some(50), None, 51, 0, false),
            (None, Some(100), 999, 100, true),
            (None, Some(100), 0, 101, false),
            (Some(50), Some(100), 60, 10, false),
            (Some(50), Some(100), 10, 150, false),
            (Some(50), Some(100), 50, 100, true),
            (Some(0), None, 0, 5, true),
            (Some(0), None, 1, 0, false),
        ];

        for (removed_limit, updated_limit, removed, updated, allowed) in cases {
            let policy = ThresholdPolicy::new(removed_limit, updated_limit);
            let decision = allow_sync(Ok(&report(removed, updated)), &policy);
            assert_eq!(
                decision.is_allowed(),
                allowed,
                "limits {:?}/{:?} counts {}/{}",
                removed_limit,
                updated_limit,
                removed,
                updated
            );
        }
    }

    #[test]
    fn test_removed_reason_text() {
        let policy = ThresholdPolicy::new(Some(50), Some(100));
        let decision = allow_sync(Ok(&report(60, 10)), &policy);

        assert_eq!(decision.reason_strings(), vec!["removed: 60 > 50".to_string()]);
    }

    #[test]
    fn test_both_reasons_reported() {
        let policy = ThresholdPolicy::new(Some(50), Some(100));
        let decision = allow_sync(Ok(&report(60, 150)), &policy);

        assert_eq!(
            decision.reason_strings(),
            vec!["removed: 60 > 50".to_string(), "updated: 150 > 100".to_string()]
        );
    }

    #[test]
    fn test_unavailable_report_blocks_even_without_limits() {
        let err = MaintenanceError::ReportFormat("no 'removed' count in diff output".to_string());
        let decision = allow_sync(Err(&err), &ThresholdPolicy::default());

        let reasons = decision.reason_strings();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("report_unavailable: "));
    }
}
