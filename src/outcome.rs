//! # Item Outcome Contract
//!
//! The per-item result record fed into the atomic counter updater, and the
//! pluggable processor boundary callers implement to perform the actual
//! domain action for one item (send an SMS, create a subscription, ...).

use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of processing a single batch item.
///
/// Secondary deltas are non-negative additions to named job counters and are
/// applied in the same atomic step as the success/failure increment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemOutcome {
    pub success: bool,
    pub secondary_deltas: HashMap<String, i64>,
    /// Error text appended to the job's `error_summary` when present
    pub error_detail: Option<String>,
}

impl ItemOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error_detail: Some(detail.into()),
            ..Self::default()
        }
    }

    /// Add `value` to the named secondary counter. Negative values are
    /// clamped to zero; the counters are monotonic by contract.
    pub fn with_delta(mut self, counter: impl Into<String>, value: i64) -> Self {
        let entry = self.secondary_deltas.entry(counter.into()).or_insert(0);
        *entry += value.max(0);
        self
    }
}

/// Caller-supplied processor invoked once per batch item.
///
/// Returning `Err` is the "processor threw" case: the orchestrator folds the
/// error text into a failure outcome locally, so the item is still counted
/// exactly once and the dispatch loop never crashes.
#[async_trait]
pub trait ItemProcessor<I>: Send + Sync {
    async fn process(&self, item: I) -> anyhow::Result<ItemOutcome>;
}

/// Blanket impl so plain async-compatible closures work as processors in
/// tests and simple embeddings.
#[async_trait]
impl<I, F> ItemProcessor<I> for F
where
    I: Send + 'static,
    F: Fn(I) -> anyhow::Result<ItemOutcome> + Send + Sync,
{
    async fn process(&self, item: I) -> anyhow::Result<ItemOutcome> {
        (self)(item)
    }
}
