//! Engine configuration.
//!
//! Small, explicit knob set: pool width for item dispatch, the retry budget
//! for stores that fall back to optimistic concurrency, and whether per-item
//! error details are folded into the job's error summary. Loadable from the
//! environment with a `BULKJOB_` prefix (e.g. `BULKJOB_MAX_CONCURRENT_ITEMS=32`).

use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of items processed concurrently per job.
    /// Bounds pressure on downstream item-processor dependencies.
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Retry budget for stores that implement the atomic increment as a
    /// compare-and-swap loop. Exhaustion is a `ConcurrencyExhausted` error,
    /// not routine behavior.
    #[serde(default = "default_max_increment_attempts")]
    pub max_increment_attempts: u32,

    /// When false, per-item error details are dropped instead of being
    /// appended to the job's error summary.
    #[serde(default = "default_append_error_summary")]
    pub append_error_summary: bool,
}

fn default_max_concurrent_items() -> usize {
    8
}

fn default_max_increment_attempts() -> u32 {
    5
}

fn default_append_error_summary() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_items: default_max_concurrent_items(),
            max_increment_attempts: default_max_increment_attempts(),
            append_error_summary: default_append_error_summary(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `BULKJOB_`-prefixed environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("BULKJOB"))
            .build()
            .map_err(|e| OrchestrationError::Configuration(e.to_string()))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| OrchestrationError::Configuration(e.to_string()))?;

        if config.max_concurrent_items == 0 {
            return Err(OrchestrationError::Configuration(
                "max_concurrent_items must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}
