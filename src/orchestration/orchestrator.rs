//! # Job Orchestrator
//!
//! Public-facing component: creates a job, dispatches its items to a bounded
//! concurrent worker pool, and feeds every item's outcome through the atomic
//! counter updater and the completion detector.
//!
//! ## Dispatch model
//!
//! `submit` spawns one supervisor task per job. The supervisor walks the item
//! list, acquires a semaphore permit per item (backpressure: a full pool
//! blocks further dispatch rather than queuing unboundedly) and spawns one
//! task per item. Each item task performs exactly one `apply_outcome` call,
//! then hands the returned committed snapshot to the completion detector.
//!
//! ## Cancellation
//!
//! Cooperative: `cancel` flips the job's status with a conditional store
//! write and raises a shared flag that the supervisor checks before starting
//! new items. In-flight item processors are never preempted; their outcomes
//! are still counted for audit, but the `Processing`-guarded terminal write
//! can no longer fire.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{JobKind, JobSnapshot, NewJob, Page};
use crate::orchestration::completion::check_and_complete;
use crate::outcome::{ItemOutcome, ItemProcessor};
use crate::status::JobStatus;
use crate::store::JobStore;

/// Optional submission metadata: kind-specific configuration and the
/// provenance of the uploaded batch file.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub kind_config: Option<serde_json::Value>,
    pub source_file_name: Option<String>,
    pub source_file_size: Option<i64>,
}

pub struct JobOrchestrator<S> {
    store: Arc<S>,
    config: EngineConfig,
    cancel_flags: Arc<DashMap<Uuid, Arc<AtomicBool>>>,
}

impl<S: JobStore> JobOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            cancel_flags: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Submit a batch for processing. Returns as soon as the job record is
    /// created and dispatch has been spawned; callers poll [`Self::status`].
    ///
    /// An empty batch is created directly in `Completed` — no dispatch, no
    /// `Processing` state.
    pub async fn submit<I, P>(
        &self,
        owner_id: Uuid,
        kind: JobKind,
        items: Vec<I>,
        processor: Arc<P>,
    ) -> Result<Uuid>
    where
        I: Send + 'static,
        P: ItemProcessor<I> + 'static,
    {
        self.submit_with_options(owner_id, kind, SubmitOptions::default(), items, processor)
            .await
            .map(|(job_id, _)| job_id)
    }

    /// [`Self::submit`] with kind configuration and batch file provenance.
    /// Returns the job id and, for non-empty batches, the supervisor handle.
    pub async fn submit_with_options<I, P>(
        &self,
        owner_id: Uuid,
        kind: JobKind,
        options: SubmitOptions,
        items: Vec<I>,
        processor: Arc<P>,
    ) -> Result<(Uuid, Option<JoinHandle<()>>)>
    where
        I: Send + 'static,
        P: ItemProcessor<I> + 'static,
    {
        let total = items.len() as i64;
        let mut new_job = NewJob::pending(owner_id, kind, total);
        new_job.kind_config = options.kind_config;
        new_job.source_file_name = options.source_file_name;
        new_job.source_file_size = options.source_file_size;

        if total == 0 {
            new_job.status = JobStatus::Completed;
            let job = self.store.create(new_job).await?;
            info!(job_id = %job.job_id, kind = %kind, "empty batch submitted; job completed at creation");
            return Ok((job.job_id, None));
        }

        let job = self.store.create(new_job).await?;
        let job_id = job.job_id;
        self.store.mark_processing(job_id).await?;
        info!(job_id = %job_id, kind = %kind, total, "job dispatch starting");

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(job_id, cancel_flag.clone());

        let handle = tokio::spawn(dispatch_job(
            self.store.clone(),
            self.config.clone(),
            job_id,
            items,
            processor,
            cancel_flag,
            self.cancel_flags.clone(),
        ));

        Ok((job_id, Some(handle)))
    }

    /// Submit and wait for every dispatched item to settle, returning the
    /// final snapshot. Intended for embedders that want join semantics
    /// instead of polling.
    pub async fn submit_and_wait<I, P>(
        &self,
        owner_id: Uuid,
        kind: JobKind,
        items: Vec<I>,
        processor: Arc<P>,
    ) -> Result<JobSnapshot>
    where
        I: Send + 'static,
        P: ItemProcessor<I> + 'static,
    {
        let (job_id, handle) = self
            .submit_with_options(owner_id, kind, SubmitOptions::default(), items, processor)
            .await?;
        if let Some(handle) = handle {
            // A panicking supervisor is a bug, not a job failure; the status
            // read below still reports whatever was committed.
            let _ = handle.await;
        }
        self.status(job_id).await
    }

    /// Request cancellation. Returns true if this call performed the
    /// `Pending | Processing -> Cancelled` transition; false when the job was
    /// already terminal. Sticky once written.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let cancelled = self.store.try_cancel(job_id).await?;
        if cancelled {
            if let Some(flag) = self.cancel_flags.get(&job_id) {
                flag.store(true, Ordering::SeqCst);
            }
            info!(job_id = %job_id, "job cancelled");
        }
        Ok(cancelled)
    }

    /// Read-only progress projection for polling.
    pub async fn status(&self, job_id: Uuid) -> Result<JobSnapshot> {
        Ok(self.store.get(job_id).await?.snapshot())
    }

    /// Submission history for one owner, newest first.
    pub async fn history(&self, owner_id: Uuid, page: Page) -> Result<Vec<JobSnapshot>> {
        let jobs = self.store.list_by_owner(owner_id, page).await?;
        Ok(jobs.iter().map(|job| job.snapshot()).collect())
    }
}

/// Supervisor task for one job: dispatch every item through the bounded pool,
/// then join all item tasks and drop the cancellation flag.
async fn dispatch_job<S, I, P>(
    store: Arc<S>,
    config: EngineConfig,
    job_id: Uuid,
    items: Vec<I>,
    processor: Arc<P>,
    cancel_flag: Arc<AtomicBool>,
    cancel_flags: Arc<DashMap<Uuid, Arc<AtomicBool>>>,
) where
    S: JobStore,
    I: Send + 'static,
    P: ItemProcessor<I> + 'static,
{
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_items));
    let mut handles = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed while the supervisor runs.
            Err(_) => break,
        };

        // Checked after the permit wait so a cancel raised while dispatch
        // was blocked on backpressure stops the next item too.
        if cancel_flag.load(Ordering::SeqCst) {
            info!(
                job_id = %job_id,
                dispatched = index,
                "cancellation requested; stopping further dispatch"
            );
            break;
        }

        let store = store.clone();
        let processor = processor.clone();
        let append_errors = config.append_error_summary;
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            process_one(
                store.as_ref(),
                processor.as_ref(),
                job_id,
                index,
                item,
                append_errors,
            )
            .await;
        }));
    }

    futures::future::join_all(handles).await;
    cancel_flags.remove(&job_id);
}

/// Process one item end to end: run the domain processor, record the outcome
/// exactly once, and give the committed snapshot to the completion detector.
async fn process_one<S, I, P>(
    store: &S,
    processor: &P,
    job_id: Uuid,
    index: usize,
    item: I,
    append_errors: bool,
) where
    S: JobStore,
    P: ItemProcessor<I>,
{
    let row = index + 1;
    let mut outcome = match processor.process(item).await {
        Ok(outcome) => outcome,
        // A processor error is a per-item failure, never a dispatch crash.
        Err(e) => {
            warn!(job_id = %job_id, row, error = %e, "item processor failed");
            ItemOutcome::failure(format!("row {row}: {e}"))
        }
    };
    if !append_errors {
        outcome.error_detail = None;
    }

    let snapshot = match store.apply_outcome(job_id, &outcome, None).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // The item is not counted; re-delivery is the caller's concern
            // (at-least-once semantics at the orchestration boundary).
            warn!(job_id = %job_id, row, error = %e, "failed to record item outcome");
            return;
        }
    };

    if let Err(e) = check_and_complete(store, &snapshot).await {
        warn!(job_id = %job_id, row, error = %e, "completion check failed");
    }
}
