//! End-to-end orchestrator behavior: dispatch through the bounded pool,
//! outcome accounting, empty batches, processor error folding, cancellation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bulkjob_core::config::EngineConfig;
use bulkjob_core::models::JobKind;
use bulkjob_core::orchestration::{JobOrchestrator, SubmitOptions};
use bulkjob_core::outcome::{ItemOutcome, ItemProcessor};
use bulkjob_core::status::JobStatus;
use bulkjob_core::store::{JobStore, MemoryJobStore};

#[derive(Clone)]
struct Recipient {
    phone: String,
    valid: bool,
}

/// Stand-in for a real per-item action (code allocation + SMS send).
struct CodeSender;

#[async_trait]
impl ItemProcessor<Recipient> for CodeSender {
    async fn process(&self, item: Recipient) -> anyhow::Result<ItemOutcome> {
        if item.valid {
            Ok(ItemOutcome::success().with_delta("units_distributed", 1))
        } else {
            Ok(ItemOutcome::failure(format!("{}: invalid phone", item.phone)))
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partial_failure_batch_lands_on_partial_success() {
    let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));

    // 3 successes carrying one unit each, 2 failures.
    let items: Vec<Recipient> = (0..5)
        .map(|i| Recipient {
            phone: format!("+155501{i:02}"),
            valid: i < 3,
        })
        .collect();

    let snapshot = orchestrator
        .submit_and_wait(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            items,
            Arc::new(CodeSender),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.processed, 5);
    assert_eq!(snapshot.succeeded, 3);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.secondary_counters["units_distributed"], 3);
    assert_eq!(snapshot.status, JobStatus::PartialSuccess);
    assert!(snapshot.completed_at.is_some());
    assert!(snapshot.error_summary.unwrap().contains("invalid phone"));
}

#[tokio::test]
async fn all_success_batch_completes() {
    let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));
    let items: Vec<Recipient> = (0..8)
        .map(|i| Recipient {
            phone: format!("+1555{i:04}"),
            valid: true,
        })
        .collect();

    let snapshot = orchestrator
        .submit_and_wait(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            items,
            Arc::new(CodeSender),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.succeeded, 8);
    assert!(snapshot.error_summary.is_none());
}

#[tokio::test]
async fn all_failure_batch_fails() {
    let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));
    let items = vec![
        Recipient {
            phone: "bad-1".into(),
            valid: false,
        },
        Recipient {
            phone: "bad-2".into(),
            valid: false,
        },
    ];

    let snapshot = orchestrator
        .submit_and_wait(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            items,
            Arc::new(CodeSender),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.succeeded, 0);
}

#[tokio::test]
async fn empty_batch_completes_at_creation_without_dispatch() {
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = JobOrchestrator::new(store.clone());

    let job_id = orchestrator
        .submit(
            Uuid::new_v4(),
            JobKind::Invitation,
            Vec::<Recipient>::new(),
            Arc::new(CodeSender),
        )
        .await
        .unwrap();

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total, 0);
    assert_eq!(job.processed, 0);
    // Never entered Processing.
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn processor_errors_become_counted_failures() {
    struct Flaky;

    #[async_trait]
    impl ItemProcessor<u32> for Flaky {
        async fn process(&self, item: u32) -> anyhow::Result<ItemOutcome> {
            if item % 2 == 0 {
                anyhow::bail!("gateway timeout for item {item}")
            }
            Ok(ItemOutcome::success())
        }
    }

    let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));
    let snapshot = orchestrator
        .submit_and_wait(
            Uuid::new_v4(),
            JobKind::Invitation,
            vec![0u32, 1, 2, 3],
            Arc::new(Flaky),
        )
        .await
        .unwrap();

    // Errors thrown by the processor are converted to failure outcomes, so
    // every item is counted and the dispatch loop survives.
    assert_eq!(snapshot.processed, 4);
    assert_eq!(snapshot.succeeded, 2);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.status, JobStatus::PartialSuccess);
    assert!(snapshot.error_summary.unwrap().contains("gateway timeout"));
}

#[tokio::test]
async fn submission_options_are_persisted() {
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = JobOrchestrator::new(store.clone());

    let options = SubmitOptions {
        kind_config: Some(serde_json::json!({"send_notification": true})),
        source_file_name: Some("farmers.xlsx".into()),
        source_file_size: Some(18_432),
    };
    let (job_id, handle) = orchestrator
        .submit_with_options(
            Uuid::new_v4(),
            JobKind::SubscriptionAssignment,
            options,
            vec![Recipient {
                phone: "+15550100".into(),
                valid: true,
            }],
            Arc::new(CodeSender),
        )
        .await
        .unwrap();
    handle.unwrap().await.unwrap();

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.source_file_name.as_deref(), Some("farmers.xlsx"));
    assert_eq!(
        job.kind_config.unwrap()["send_notification"],
        serde_json::json!(true)
    );
}

#[tokio::test]
async fn history_lists_owner_jobs() {
    let orchestrator = JobOrchestrator::new(Arc::new(MemoryJobStore::new()));
    let owner = Uuid::new_v4();

    for _ in 0..2 {
        orchestrator
            .submit_and_wait(
                owner,
                JobKind::Invitation,
                vec![Recipient {
                    phone: "+15550100".into(),
                    valid: true,
                }],
                Arc::new(CodeSender),
            )
            .await
            .unwrap();
    }

    let history = orchestrator
        .history(owner, Default::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.status == JobStatus::Completed));
}

/// Processor that blocks each item on a gate the test releases, so the test
/// controls exactly when items settle relative to cancellation.
struct Gated {
    gate: Arc<tokio::sync::Semaphore>,
    started: Arc<AtomicUsize>,
}

#[async_trait]
impl ItemProcessor<usize> for Gated {
    async fn process(&self, _item: usize) -> anyhow::Result<ItemOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await?;
        permit.forget();
        Ok(ItemOutcome::success())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_dispatch_and_sticks() {
    let store = Arc::new(MemoryJobStore::new());
    let config = EngineConfig {
        max_concurrent_items: 1,
        ..EngineConfig::default()
    };
    let orchestrator = JobOrchestrator::with_config(store.clone(), config);

    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let started = Arc::new(AtomicUsize::new(0));
    let processor = Arc::new(Gated {
        gate: gate.clone(),
        started: started.clone(),
    });

    let (job_id, handle) = orchestrator
        .submit_with_options(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            SubmitOptions::default(),
            vec![0usize, 1, 2, 3],
            processor,
        )
        .await
        .unwrap();

    // Wait for the first item to be in flight (pool width is 1).
    while started.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(orchestrator.cancel(job_id).await.unwrap());
    // Second cancel is a no-op.
    assert!(!orchestrator.cancel(job_id).await.unwrap());

    // Release the in-flight item; the supervisor must stop before item 2.
    gate.add_permits(4);
    handle.unwrap().await.unwrap();

    let job = store.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    // The in-flight item completed after cancellation and was still counted.
    assert_eq!(job.processed, 1);
    assert_eq!(job.succeeded, 1);
    assert_eq!(started.load(Ordering::SeqCst), 1);

    // Cancellation is sticky: the job never becomes Completed.
    let status = orchestrator.status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn large_batch_counts_every_item_exactly_once() {
    let orchestrator = JobOrchestrator::with_config(
        Arc::new(MemoryJobStore::new()),
        EngineConfig {
            max_concurrent_items: 16,
            ..EngineConfig::default()
        },
    );

    let items: Vec<Recipient> = (0..300)
        .map(|i| Recipient {
            phone: format!("+1555{i:05}"),
            valid: i % 7 != 0,
        })
        .collect();
    let expected_failures = (0..300).filter(|i| i % 7 == 0).count() as i64;

    let snapshot = orchestrator
        .submit_and_wait(
            Uuid::new_v4(),
            JobKind::CodeDistribution,
            items,
            Arc::new(CodeSender),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.processed, 300);
    assert_eq!(snapshot.failed, expected_failures);
    assert_eq!(snapshot.succeeded, 300 - expected_failures);
    assert_eq!(
        snapshot.secondary_counters["units_distributed"],
        300 - expected_failures
    );
    assert_eq!(snapshot.status, JobStatus::PartialSuccess);
}
