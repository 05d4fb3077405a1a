use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable fact: step `step_id` of run `run_id` produced `result`.
///
/// Never overwritten while the run is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: Uuid,
    /// Stable name of the instruction within its definition.
    pub step_id: String,
    pub result: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(
        run_id: Uuid,
        step_id: impl Into<String>,
        result: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            step_id: step_id.into(),
            result,
            recorded_at,
        }
    }
}

/// Outcome of a compare-and-set write to the step ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// The record now stored under the key.
    pub record: StepRecord,
    /// False when another writer got there first; `record` is theirs.
    pub won: bool,
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay each time.
    Fixed,
    /// Delay increases linearly.
    Linear,
    /// Delay doubles each time.
    #[default]
    Exponential,
}

/// Retry behaviour for transient step failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate the delay after the given (1-based) failed attempt.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay;
        let backoff = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        };
        backoff.min(self.max_backoff)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
