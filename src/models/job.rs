//! # Job Model
//!
//! The persisted bulk job aggregate and its read-only progress projection.
//!
//! ## Overview
//!
//! A `Job` is the single consistency boundary of the engine: one row per bulk
//! submission, carrying the item counters that concurrent workers increment
//! and the status that the completion path transitions exactly once. All
//! counter and status mutation flows through the [`crate::store::JobStore`]
//! primitives; nothing else writes to this aggregate.
//!
//! ## Counters
//!
//! `processed`, `succeeded` and `failed` are monotonic and satisfy
//! `succeeded + failed == processed <= total` at every committed state.
//! Kind-specific statistics (codes distributed, notifications sent, ...) live
//! in the `secondary_counters` map and are incremented in the same atomic
//! step as the primary counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::status::JobStatus;

/// Discriminator for the kind of bulk workload a job runs.
///
/// Kind-specific configuration (default tiers, notification channel, ...) is
/// carried as an opaque payload in [`Job::kind_config`]; the engine never
/// interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Distribute purchased codes to recipients
    CodeDistribution,
    /// Assign subscriptions directly to accounts
    SubscriptionAssignment,
    /// Send registration invitations
    Invitation,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeDistribution => write!(f, "code_distribution"),
            Self::SubscriptionAssignment => write!(f, "subscription_assignment"),
            Self::Invitation => write!(f, "invitation"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code_distribution" => Ok(Self::CodeDistribution),
            "subscription_assignment" => Ok(Self::SubscriptionAssignment),
            "invitation" => Ok(Self::Invitation),
            _ => Err(format!("Invalid job kind: {s}")),
        }
    }
}

/// A bulk job aggregate as persisted in the job record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    /// Opaque kind-specific configuration supplied at submission
    pub kind_config: Option<serde_json::Value>,
    /// Total number of items in the batch; immutable after creation
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// Named monotonic counters, kind-specific (e.g. `units_distributed`)
    pub secondary_counters: HashMap<String, i64>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Reserved reference to a post-completion detail report
    pub result_artifact_ref: Option<String>,
    /// Append-only newline-joined per-item error lines
    pub error_summary: Option<String>,
    /// Name of the uploaded batch file, if the caller had one
    pub source_file_name: Option<String>,
    /// Size in bytes of the uploaded batch file
    pub source_file_size: Option<i64>,
}

impl Job {
    /// Remaining items that have not reached a per-item outcome yet.
    pub fn remaining(&self) -> i64 {
        self.total - self.processed
    }

    /// Read-only progress projection for polling callers.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            kind: self.kind,
            total: self.total,
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            secondary_counters: self.secondary_counters.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_summary: self.error_summary.clone(),
        }
    }
}

/// New job for creation (without generated fields).
///
/// Built by the orchestrator at submission time; `status` is `Pending` for a
/// non-empty batch and `Completed` for the empty-batch special case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub kind_config: Option<serde_json::Value>,
    pub total: i64,
    pub status: JobStatus,
    pub source_file_name: Option<String>,
    pub source_file_size: Option<i64>,
}

impl NewJob {
    /// New pending job for a batch of `total` items.
    pub fn pending(owner_id: Uuid, kind: JobKind, total: i64) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            owner_id,
            kind,
            kind_config: None,
            total,
            status: JobStatus::Pending,
            source_file_name: None,
            source_file_size: None,
        }
    }

    pub fn with_kind_config(mut self, config: serde_json::Value) -> Self {
        self.kind_config = Some(config);
        self
    }

    pub fn with_source_file(mut self, name: impl Into<String>, size: i64) -> Self {
        self.source_file_name = Some(name.into());
        self.source_file_size = Some(size);
        self
    }
}

/// Progress projection returned by `status()` and `apply_outcome()`.
///
/// Values reflect the committed store state at the time of the read, which is
/// what the completion detector requires: multiple workers race to increment,
/// and each must see the true post-update counters rather than a local guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub secondary_counters: HashMap<String, i64>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

impl JobSnapshot {
    /// True when every item has reached a per-item outcome.
    pub fn all_processed(&self) -> bool {
        self.processed >= self.total
    }
}

/// Pagination window for owner history listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_string_conversion() {
        assert_eq!(JobKind::CodeDistribution.to_string(), "code_distribution");
        assert_eq!(
            "subscription_assignment".parse::<JobKind>().unwrap(),
            JobKind::SubscriptionAssignment
        );
        assert!("mystery".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_new_job_builders() {
        let owner = Uuid::new_v4();
        let new_job = NewJob::pending(owner, JobKind::Invitation, 42)
            .with_kind_config(serde_json::json!({"send_sms": true}))
            .with_source_file("farmers.xlsx", 18_432);

        assert_eq!(new_job.owner_id, owner);
        assert_eq!(new_job.total, 42);
        assert_eq!(new_job.status, JobStatus::Pending);
        assert_eq!(new_job.source_file_name.as_deref(), Some("farmers.xlsx"));
        assert_eq!(new_job.source_file_size, Some(18_432));
    }

    #[test]
    fn test_snapshot_projection() {
        let job = Job {
            job_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            kind: JobKind::CodeDistribution,
            kind_config: None,
            total: 10,
            processed: 7,
            succeeded: 6,
            failed: 1,
            secondary_counters: HashMap::from([("units_distributed".to_string(), 6)]),
            status: JobStatus::Processing,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            result_artifact_ref: None,
            error_summary: Some("row 4: no codes left".to_string()),
            source_file_name: None,
            source_file_size: None,
        };

        let snapshot = job.snapshot();
        assert_eq!(snapshot.processed, 7);
        assert_eq!(snapshot.secondary_counters["units_distributed"], 6);
        assert!(!snapshot.all_processed());
        assert_eq!(job.remaining(), 3);
    }
}
