//! Concurrency properties of the atomic counter updater and the completion
//! detector: no lost updates under maximum contention, exactly-once terminal
//! transition among simultaneous finishers, idempotent re-delivery.

use std::sync::Arc;
use uuid::Uuid;

use bulkjob_core::models::{JobKind, NewJob};
use bulkjob_core::orchestration::check_and_complete;
use bulkjob_core::outcome::ItemOutcome;
use bulkjob_core::status::JobStatus;
use bulkjob_core::store::{JobStore, MemoryJobStore};

async fn processing_job(store: &MemoryJobStore, total: i64) -> Uuid {
    let job = store
        .create(NewJob::pending(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            total,
        ))
        .await
        .unwrap();
    store.mark_processing(job.job_id).await.unwrap();
    job.job_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn no_lost_updates_under_max_concurrency() {
    const TOTAL: i64 = 500;

    let store = Arc::new(MemoryJobStore::new());
    let job_id = processing_job(&store, TOTAL).await;

    let mut handles = Vec::new();
    for i in 0..TOTAL {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let outcome = if i % 5 == 0 {
                ItemOutcome::failure(format!("row {i}: simulated"))
            } else {
                ItemOutcome::success().with_delta("units_distributed", 1)
            };
            let snapshot = store.apply_outcome(job_id, &outcome, None).await.unwrap();
            // The counter invariant holds at every committed snapshot.
            assert_eq!(snapshot.succeeded + snapshot.failed, snapshot.processed);
            assert!(snapshot.processed <= snapshot.total);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.processed, TOTAL);
    assert_eq!(job.failed, TOTAL / 5);
    assert_eq!(job.succeeded, TOTAL - TOTAL / 5);
    assert_eq!(
        job.secondary_counters["units_distributed"],
        TOTAL - TOTAL / 5
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn exactly_one_finisher_wins_terminal_transition() {
    const TOTAL: i64 = 64;

    let store = Arc::new(MemoryJobStore::new());
    let job_id = processing_job(&store, TOTAL).await;

    let mut handles = Vec::new();
    for _ in 0..TOTAL {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let snapshot = store
                .apply_outcome(job_id, &ItemOutcome::success(), None)
                .await
                .unwrap();
            check_and_complete(store.as_ref(), &snapshot).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_redelivery_with_same_key_counts_once() {
    let store = Arc::new(MemoryJobStore::new());
    let job_id = processing_job(&store, 10).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .apply_outcome(job_id, &ItemOutcome::success(), Some("row-7"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.processed, 1);
    assert_eq!(job.succeeded, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn late_outcomes_after_cancellation_never_complete_the_job() {
    const TOTAL: i64 = 16;

    let store = Arc::new(MemoryJobStore::new());
    let job_id = processing_job(&store, TOTAL).await;
    assert!(store.try_cancel(job_id).await.unwrap());

    // Every in-flight item settles after cancellation and is still counted.
    let mut handles = Vec::new();
    for _ in 0..TOTAL {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let snapshot = store
                .apply_outcome(job_id, &ItemOutcome::success(), None)
                .await
                .unwrap();
            check_and_complete(store.as_ref(), &snapshot).await.unwrap()
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap());
    }

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.processed, TOTAL);
    assert_eq!(job.status, JobStatus::Cancelled);
}
