//! Persistence contracts for the engine.
//!
//! The step ledger, timer store and run store are the only shared mutable
//! state. Every mutation is keyed by run ID, so implementations never need a
//! lock wider than one run.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::workflow::{BoxFuture, Recorded, RunStatus, StepRecord, TimerEntry, WorkflowRun};

/// Durable, append-only record of step completions.
pub trait StepLedger: Send + Sync + 'static {
    /// Compare-and-set on `(run_id, step_id)`.
    ///
    /// Exactly one concurrent writer wins. A loser gets the winner's record
    /// back with `won == false` and must use it instead of its own result.
    fn record_step(&self, record: StepRecord) -> BoxFuture<'_, Result<Recorded>>;

    fn get_step<'a>(
        &'a self,
        run_id: Uuid,
        step_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<StepRecord>>>;

    /// All records of a run, oldest first.
    fn steps_for_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<StepRecord>>>;

    /// Drop the history of a finished run. Returns the number of records removed.
    fn purge_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>>;
}

/// Durable registry of pending wake-ups.
pub trait TimerStore: Send + Sync + 'static {
    /// Register a timer. Idempotent per `(run_id, timer_id)`: returns false
    /// if the timer already existed.
    fn schedule(&self, entry: TimerEntry) -> BoxFuture<'_, Result<bool>>;

    /// Claim and remove up to `limit` timers with `fire_at <= now`.
    ///
    /// A claimed entry is never returned again, even to a concurrent caller.
    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<TimerEntry>>>;

    /// Remove every pending timer of a run. Returns the number removed.
    fn cancel(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>>;

    /// Pending timers of a run.
    fn pending_for(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<TimerEntry>>>;
}

/// Storage for workflow runs.
pub trait RunStore: Send + Sync + 'static {
    /// Insert unless a run with the same ID exists. Returns the stored run
    /// and whether this call created it.
    fn insert_if_absent(&self, run: WorkflowRun) -> BoxFuture<'_, Result<(WorkflowRun, bool)>>;

    fn get(&self, run_id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowRun>>>;

    /// Move a run to `status`, bumping `updated_at`.
    ///
    /// Returns false without writing if the run is missing or already
    /// terminal. `error` replaces `last_error` when given.
    fn transition(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Non-terminal runs not updated since `before`.
    fn stale(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<WorkflowRun>>>;

    /// Delete terminal runs last updated before `before`. Returns their IDs.
    fn purge_finished(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<Uuid>>>;
}
