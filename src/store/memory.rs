//! In-process job store.
//!
//! Backed by a `DashMap`; every mutation of one job happens while holding
//! that entry's shard write lock, which is what makes the increment
//! indivisible without a compare-and-swap loop. Suitable for tests and
//! single-process deployments only — the production topology runs multiple
//! worker instances against [`super::PgJobStore`].

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Job, JobSnapshot, NewJob, Page};
use crate::outcome::ItemOutcome;
use crate::status::JobStatus;
use crate::store::JobStore;

struct JobEntry {
    job: Job,
    seen_keys: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, JobEntry>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            job_id: new_job.job_id,
            owner_id: new_job.owner_id,
            kind: new_job.kind,
            kind_config: new_job.kind_config,
            total: new_job.total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            secondary_counters: Default::default(),
            status: new_job.status,
            created_at: now,
            started_at: None,
            completed_at: new_job.status.is_terminal().then_some(now),
            result_artifact_ref: None,
            error_summary: None,
            source_file_name: new_job.source_file_name,
            source_file_size: new_job.source_file_size,
        };

        match self.jobs.entry(job.job_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::DuplicateJob(job.job_id))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let entry = vacant.insert(JobEntry {
                    job: job.clone(),
                    seen_keys: HashSet::new(),
                });
                drop(entry);
                Ok(job)
            }
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.job.clone())
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn list_by_owner(&self, owner_id: Uuid, page: Page) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.job.owner_id == owner_id)
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = page.offset.max(0) as usize;
        let limit = page.limit.max(0) as usize;
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        if entry.job.status != JobStatus::Pending {
            return Ok(false);
        }
        entry.job.status = JobStatus::Processing;
        entry.job.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn apply_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
        idempotency_key: Option<&str>,
    ) -> Result<JobSnapshot, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        // Duplicate delivery of an already-counted item is a no-op.
        if let Some(key) = idempotency_key {
            if entry.seen_keys.contains(key) {
                return Ok(entry.job.snapshot());
            }
        }

        // Counters freeze once a success/failure terminal status has been
        // written; Cancelled still counts late arrivals for audit. The
        // processed < total guard keeps an unkeyed duplicate callback from
        // breaking the counter invariant.
        if entry.job.status.is_outcome_terminal() || entry.job.processed >= entry.job.total {
            return Ok(entry.job.snapshot());
        }

        if let Some(key) = idempotency_key {
            entry.seen_keys.insert(key.to_string());
        }

        let job = &mut entry.job;
        job.processed += 1;
        if outcome.success {
            job.succeeded += 1;
        } else {
            job.failed += 1;
        }
        for (counter, delta) in &outcome.secondary_deltas {
            *job.secondary_counters.entry(counter.clone()).or_insert(0) += (*delta).max(0);
        }
        if let Some(detail) = &outcome.error_detail {
            match &mut job.error_summary {
                Some(summary) => {
                    summary.push('\n');
                    summary.push_str(detail);
                }
                None => job.error_summary = Some(detail.clone()),
            }
        }

        Ok(job.snapshot())
    }

    async fn try_complete(&self, job_id: Uuid, terminal: JobStatus) -> Result<bool, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        if entry.job.status != JobStatus::Processing {
            return Ok(false);
        }
        entry.job.status = terminal;
        entry.job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn try_cancel(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        if !entry.job.status.is_active() {
            return Ok(false);
        }
        entry.job.status = JobStatus::Cancelled;
        entry.job.completed_at = Some(Utc::now());
        Ok(true)
    }
}
