//! Structured error types for the store and orchestration boundaries.

use uuid::Uuid;

/// Errors surfaced by the job record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced job id does not exist; surfaced to the caller, never retried
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Id collision at creation; indicates an id-generation bug
    #[error("Duplicate job id: {0}")]
    DuplicateJob(Uuid),

    /// The optimistic-retry loop for an atomic increment exceeded its budget.
    /// Unexpectedly high contention; the item is NOT counted and should be
    /// re-delivered by the caller.
    #[error("Atomic increment for job {job_id} did not converge after {attempts} attempts")]
    ConcurrencyExhausted { job_id: Uuid, attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the orchestrator's public operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
