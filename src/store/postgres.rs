//! PostgreSQL job store.
//!
//! The production implementation. The per-item increment is a single UPDATE
//! statement evaluated by the database (`processed = processed + 1`, ...), so
//! concurrent workers serialize on the row lock and no read-modify-write race
//! exists. Terminal and cancel transitions are conditional writes guarded on
//! the current status; `rows_affected` decides the winner.
//!
//! Idempotency keys are recorded in `bulk_job_outcomes` inside the same
//! transaction as the increment, so a re-delivered item can never double
//! count even if the worker crashed between the two writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Job, JobKind, JobSnapshot, NewJob, Page};
use crate::outcome::ItemOutcome;
use crate::status::JobStatus;
use crate::store::JobStore;

const JOB_COLUMNS: &str = "job_id, owner_id, kind, kind_config, total, processed, succeeded, \
     failed, secondary_counters, status, created_at, started_at, completed_at, \
     result_artifact_ref, error_summary, source_file_name, source_file_size";

/// Atomic increment applied by the database in one indivisible statement.
///
/// The jsonb subquery folds the delta map into the stored counters while the
/// row lock is held. Outcome-terminal jobs are excluded from the WHERE so
/// late duplicate callbacks become no-ops; `cancelled` stays eligible because
/// in-flight items of a cancelled job are still counted for audit.
const APPLY_OUTCOME_SQL: &str = r"
    UPDATE bulk_jobs
    SET processed = processed + 1,
        succeeded = succeeded + $2,
        failed = failed + $3,
        secondary_counters = secondary_counters || COALESCE((
            SELECT jsonb_object_agg(
                d.key,
                to_jsonb(COALESCE(bulk_jobs.secondary_counters ->> d.key, '0')::bigint + d.value::bigint)
            )
            FROM jsonb_each_text($4::jsonb) AS d(key, value)
        ), '{}'::jsonb),
        error_summary = CASE
            WHEN $5::text IS NULL THEN error_summary
            ELSE COALESCE(error_summary || E'\n', '') || $5::text
        END
    WHERE job_id = $1
      AND status NOT IN ('completed', 'partial_success', 'failed')
      AND processed < total
    RETURNING job_id, owner_id, kind, kind_config, total, processed, succeeded,
              failed, secondary_counters, status, created_at, started_at, completed_at,
              result_artifact_ref, error_summary, source_file_name, source_file_size
";

#[derive(Debug, FromRow)]
struct JobRow {
    job_id: Uuid,
    owner_id: Uuid,
    kind: String,
    kind_config: Option<serde_json::Value>,
    total: i64,
    processed: i64,
    succeeded: i64,
    failed: i64,
    secondary_counters: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result_artifact_ref: Option<String>,
    error_summary: Option<String>,
    source_file_name: Option<String>,
    source_file_size: Option<i64>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, StoreError> {
        let kind: JobKind = serde_json::from_value(serde_json::Value::String(row.kind))?;
        let status: JobStatus = serde_json::from_value(serde_json::Value::String(row.status))?;
        let secondary_counters: HashMap<String, i64> =
            serde_json::from_value(row.secondary_counters)?;

        Ok(Job {
            job_id: row.job_id,
            owner_id: row.owner_id,
            kind,
            kind_config: row.kind_config,
            total: row.total,
            processed: row.processed,
            succeeded: row.succeeded,
            failed: row.failed,
            secondary_counters,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            result_artifact_ref: row.result_artifact_ref,
            error_summary: row.error_summary,
            source_file_name: row.source_file_name,
            source_file_size: row.source_file_size,
        })
    }
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the crate's embedded migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM bulk_jobs WHERE job_id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn current_snapshot(&self, job_id: Uuid) -> Result<JobSnapshot, StoreError> {
        self.fetch_job(job_id)
            .await?
            .map(|job| job.snapshot())
            .ok_or(StoreError::JobNotFound(job_id))
    }

    /// Non-negative delta map as a jsonb bind value.
    fn deltas_as_json(outcome: &ItemOutcome) -> Result<serde_json::Value, StoreError> {
        let clamped: HashMap<&str, i64> = outcome
            .secondary_deltas
            .iter()
            .map(|(k, v)| (k.as_str(), (*v).max(0)))
            .collect();
        Ok(serde_json::to_value(clamped)?)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let sql = format!(
            "INSERT INTO bulk_jobs (job_id, owner_id, kind, kind_config, total, status, completed_at, \
                                    source_file_name, source_file_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {JOB_COLUMNS}"
        );

        // Empty batches are created directly in a terminal status, so the
        // completion timestamp is set at insert time.
        let completed_at: Option<DateTime<Utc>> =
            new_job.status.is_terminal().then(Utc::now);

        let result = sqlx::query_as::<_, JobRow>(&sql)
            .bind(new_job.job_id)
            .bind(new_job.owner_id)
            .bind(new_job.kind.to_string())
            .bind(new_job.kind_config)
            .bind(new_job.total)
            .bind(new_job.status.to_string())
            .bind(completed_at)
            .bind(new_job.source_file_name)
            .bind(new_job.source_file_size)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Job::try_from(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateJob(new_job.job_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.fetch_job(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn list_by_owner(&self, owner_id: Uuid, page: Page) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM bulk_jobs \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC \
             OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner_id)
            .bind(page.offset.max(0))
            .bind(page.limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bulk_jobs SET status = 'processing', started_at = now() \
             WHERE job_id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_outcome(
        &self,
        job_id: Uuid,
        outcome: &ItemOutcome,
        idempotency_key: Option<&str>,
    ) -> Result<JobSnapshot, StoreError> {
        let succeeded_delta: i64 = i64::from(outcome.success);
        let failed_delta: i64 = i64::from(!outcome.success);
        let deltas = Self::deltas_as_json(outcome)?;

        let mut tx = self.pool.begin().await?;

        if let Some(key) = idempotency_key {
            let inserted = sqlx::query(
                "INSERT INTO bulk_job_outcomes (job_id, idempotency_key) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(job_id)
            .bind(key)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(result) if result.rows_affected() == 0 => {
                    // Re-delivered item: already counted, return the current
                    // committed state instead of double counting.
                    tx.commit().await?;
                    return self.current_snapshot(job_id).await;
                }
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    return Err(StoreError::JobNotFound(job_id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let updated = sqlx::query_as::<_, JobRow>(APPLY_OUTCOME_SQL)
            .bind(job_id)
            .bind(succeeded_delta)
            .bind(failed_delta)
            .bind(deltas)
            .bind(outcome.error_detail.as_deref())
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        match updated {
            // RETURNING carries the committed post-update values; this is the
            // snapshot the completion detector must see.
            Some(row) => Ok(Job::try_from(row)?.snapshot()),
            // Either the job does not exist or its counters are frozen by an
            // outcome-terminal status; the snapshot read distinguishes them.
            None => self.current_snapshot(job_id).await,
        }
    }

    async fn try_complete(&self, job_id: Uuid, terminal: JobStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bulk_jobs SET status = $2, completed_at = now() \
             WHERE job_id = $1 AND status = 'processing'",
        )
        .bind(job_id)
        .bind(terminal.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_cancel(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bulk_jobs SET status = 'cancelled', completed_at = now() \
             WHERE job_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
