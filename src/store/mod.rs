//! # Job Record Store
//!
//! The persistence boundary for job aggregates. Every counter and status
//! mutation in the engine flows through this trait; the contract is that
//! `apply_outcome` is indivisible with respect to concurrent callers for the
//! same job, and that the terminal/cancel transitions are conditional writes
//! where only one caller can win.
//!
//! Two implementations ship with the crate: [`MemoryJobStore`] for tests and
//! single-process deployments, and [`PgJobStore`] backed by PostgreSQL for
//! the multi-worker production topology.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Job, JobSnapshot, NewJob, Page};
use crate::outcome::ItemOutcome;
use crate::status::JobStatus;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new job. Fails with [`StoreError::DuplicateJob`] on id
    /// collision, which indicates an id-generation bug rather than a
    /// recoverable condition.
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    /// Point-read of a job aggregate.
    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError>;

    /// History listing for one owner, newest first.
    async fn list_by_owner(&self, owner_id: Uuid, page: Page) -> Result<Vec<Job>, StoreError>;

    /// Conditional `Pending -> Processing` transition; records `started_at`
    /// once. Returns false if the job was not in `Pending`.
    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// Apply exactly one item outcome to the job's counters, indivisibly.
    ///
    /// Returns the post-update snapshot as committed, which callers feed to
    /// the completion detector. With an `idempotency_key` already seen for
    /// this job, or once the job sits in an outcome-terminal status, the call
    /// is a no-op returning the current snapshot. Late outcomes for a
    /// `Cancelled` job still increment counters for audit.
    async fn apply_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
        idempotency_key: Option<&str>,
    ) -> Result<JobSnapshot, StoreError>;

    /// Conditional terminal write: `Processing -> terminal`, setting
    /// `completed_at`. Returns false when another caller already moved the
    /// job out of `Processing` (the expected result for all but one of N
    /// simultaneous finishers, and for cancelled jobs).
    async fn try_complete(&self, job_id: Uuid, terminal: JobStatus) -> Result<bool, StoreError>;

    /// Conditional `Pending | Processing -> Cancelled` transition. Sticky:
    /// once written, no completion path can overwrite it.
    async fn try_cancel(&self, job_id: Uuid) -> Result<bool, StoreError>;
}
