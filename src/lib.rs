#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bulk Job Core
//!
//! Bulk job orchestration engine with atomic, race-free progress tracking.
//!
//! ## Overview
//!
//! The engine executes large fan-out workloads — distributing thousands of
//! codes, sending thousands of invitations, assigning thousands of
//! subscriptions — as independently processed items across bounded concurrent
//! workers, while a single job record remains the race-condition-free source
//! of truth for progress and final outcome classification.
//!
//! The hard requirements, and how they are met:
//!
//! - **No lost updates**: every item outcome is applied with a single
//!   indivisible store operation (`processed = processed + 1 ...` evaluated
//!   by PostgreSQL, or an entry-locked mutation in the in-memory store) that
//!   returns the committed post-update snapshot.
//! - **Exactly-once terminal transition**: when `processed` reaches `total`,
//!   every concurrent finisher races to a conditional status write guarded on
//!   `Processing`; exactly one wins, the rest observe zero affected rows.
//! - **Partial-failure classification**: the terminal status is a pure
//!   function of the final success/failure counters
//!   (`Completed | PartialSuccess | Failed`).
//! - **At-least-once tolerance**: optional per-item idempotency keys make
//!   re-delivered outcomes no-ops instead of double counts.
//!
//! ## Module Organization
//!
//! - [`models`] - Job aggregate, submission record, progress snapshot
//! - [`status`] - Job state machine vocabulary and the terminal classifier
//! - [`store`] - Persistence boundary: `JobStore` trait, in-memory and
//!   PostgreSQL implementations
//! - [`outcome`] - Per-item outcome contract and the pluggable processor
//! - [`orchestration`] - Dispatch pool, cancellation, completion detection
//! - [`config`] - Engine configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Optional tracing initialization for embedding processes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bulkjob_core::models::JobKind;
//! use bulkjob_core::orchestration::JobOrchestrator;
//! use bulkjob_core::outcome::ItemOutcome;
//! use bulkjob_core::store::MemoryJobStore;
//!
//! # async fn example() -> bulkjob_core::error::Result<()> {
//! let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));
//!
//! let recipients = vec!["+15550100".to_string(), "+15550101".to_string()];
//! let processor = Arc::new(|_phone: String| -> anyhow::Result<ItemOutcome> {
//!     // Perform the domain action for one item here.
//!     Ok(ItemOutcome::success().with_delta("units_distributed", 1))
//! });
//!
//! let owner = uuid::Uuid::new_v4();
//! let job_id = orchestrator
//!     .submit(owner, JobKind::CodeDistribution, recipients, processor)
//!     .await?;
//!
//! let progress = orchestrator.status(job_id).await?;
//! println!("{}/{} processed", progress.processed, progress.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod outcome;
pub mod status;
pub mod store;

pub use config::EngineConfig;
pub use error::{OrchestrationError, Result, StoreError};
pub use models::{Job, JobKind, JobSnapshot, NewJob, Page};
pub use orchestration::{check_and_complete, JobOrchestrator, SubmitOptions};
pub use outcome::{ItemOutcome, ItemProcessor};
pub use status::{classify, JobStatus};
pub use store::{JobStore, MemoryJobStore, PgJobStore};
