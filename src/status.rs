//! # Job Status & Classification
//!
//! Job lifecycle states and the pure success/failure-ratio classifier that
//! picks the terminal status once every item has been processed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states for a bulk job.
///
/// Transitions: `Pending -> Processing -> {Completed | PartialSuccess | Failed}`,
/// plus `Pending | Processing -> Cancelled`. Terminal states are written
/// exactly once via conditional store updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Initial state when the job is created, before dispatch
    Pending,
    /// Items are being dispatched and processed
    Processing,
    /// Every item succeeded
    Completed,
    /// Some items succeeded, some failed
    PartialSuccess,
    /// Every item failed
    Failed,
    /// Cancelled by an external request before all items finished
    Cancelled,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialSuccess | Self::Failed | Self::Cancelled
        )
    }

    /// Check if this is an outcome terminal reached via the completion path.
    ///
    /// `Cancelled` is terminal but not an outcome: late item results for a
    /// cancelled job still increment counters for audit, whereas outcome
    /// terminals freeze the counters against duplicate callbacks.
    pub fn is_outcome_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::PartialSuccess | Self::Failed)
    }

    /// Check if this is an active state (items may still be dispatched)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partial_success" => Ok(Self::PartialSuccess),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// Map final counters to a terminal status.
///
/// Pure function: `failed == 0` is a clean completion (this includes the
/// empty batch, where both counters are zero), any mix is a partial success,
/// and all-failures is a failure.
pub fn classify(succeeded: i64, failed: i64) -> JobStatus {
    if failed == 0 {
        JobStatus::Completed
    } else if succeeded > 0 {
        JobStatus::PartialSuccess
    } else {
        JobStatus::Failed
    }
}
