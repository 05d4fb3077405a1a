use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending wake-up for a suspended run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub run_id: Uuid,
    /// ID of the suspend instruction that created the timer.
    pub timer_id: String,
    pub fire_at: DateTime<Utc>,
    /// Handed to the run on resumption.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TimerEntry {
    pub fn new(
        run_id: Uuid,
        timer_id: impl Into<String>,
        fire_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            timer_id: timer_id.into(),
            fire_at,
            payload: serde_json::json!({ "fire_at": fire_at }),
            created_at,
        }
    }

    /// Check if the timer may fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}

/// Ledger result recorded once a suspend point has been passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    /// True if the run actually suspended and was woken by a timer.
    pub slept: bool,
    /// The computed deadline, if any.
    pub fire_at: Option<DateTime<Utc>>,
    /// When execution continued past the suspend point.
    pub passed_at: DateTime<Utc>,
}

impl SleepRecord {
    /// The deadline was absent or already passed; no timer was created.
    pub fn skipped(fire_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            slept: false,
            fire_at,
            passed_at: now,
        }
    }

    /// The run waited on a timer and woke.
    pub fn woke(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            slept: true,
            fire_at: Some(fire_at),
            passed_at: now,
        }
    }
}
