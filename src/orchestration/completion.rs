//! # Completion Detector
//!
//! Decides, from a committed post-update snapshot, whether a job has reached
//! "all items processed" and if so performs the terminal transition exactly
//! once. Every worker that finishes an item calls this; when the last items
//! complete near-simultaneously all of them see `processed == total`, race to
//! the conditional write, and exactly one wins.

use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::JobSnapshot;
use crate::status::classify;
use crate::store::JobStore;

/// Attempt the terminal transition for a job whose snapshot may show it
/// finished. Returns true only for the single caller whose conditional write
/// took effect.
///
/// Losing the race is the expected result for all but one of N simultaneous
/// finishers (and for every finisher of a cancelled job, since the write is
/// guarded on `Processing`); it is reported at debug level, never as an error.
pub async fn check_and_complete<S>(store: &S, snapshot: &JobSnapshot) -> Result<bool, StoreError>
where
    S: JobStore + ?Sized,
{
    if !snapshot.all_processed() {
        return Ok(false);
    }

    let terminal = classify(snapshot.succeeded, snapshot.failed);
    let won = store.try_complete(snapshot.job_id, terminal).await?;

    if won {
        info!(
            job_id = %snapshot.job_id,
            kind = %snapshot.kind,
            total = snapshot.total,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            status = %terminal,
            "job completed"
        );
    } else {
        debug!(
            job_id = %snapshot.job_id,
            status = %terminal,
            "terminal transition already performed by another finisher"
        );
    }

    Ok(won)
}
