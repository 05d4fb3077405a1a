use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::lock;
use crate::error::{GoflowError, Result};
use crate::store::{RunStore, StepLedger, TimerStore};
use crate::workflow::{BoxFuture, Recorded, RunStatus, StepRecord, TimerEntry, WorkflowRun};

/// In-memory step ledger.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<StepRecord>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write a record directly, bypassing compare-and-set.
    pub fn inject(&self, record: StepRecord) {
        lock(&self.records).push(record);
    }

    /// All records, in insertion order.
    pub fn records(&self) -> Vec<StepRecord> {
        lock(&self.records).clone()
    }

    pub fn has_step(&self, run_id: Uuid, step_id: &str) -> bool {
        lock(&self.records)
            .iter()
            .any(|r| r.run_id == run_id && r.step_id == step_id)
    }

    /// Number of winning compare-and-set writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GoflowError::Store("step ledger unavailable".into()));
        }
        Ok(())
    }
}

impl StepLedger for MemoryLedger {
    fn record_step(&self, record: StepRecord) -> BoxFuture<'_, Result<Recorded>> {
        Box::pin(async move {
            self.check()?;
            let mut records = lock(&self.records);
            if let Some(existing) = records
                .iter()
                .find(|r| r.run_id == record.run_id && r.step_id == record.step_id)
            {
                return Ok(Recorded {
                    record: existing.clone(),
                    won: false,
                });
            }
            records.push(record.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Recorded { record, won: true })
        })
    }

    fn get_step<'a>(
        &'a self,
        run_id: Uuid,
        step_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<StepRecord>>> {
        Box::pin(async move {
            self.check()?;
            Ok(lock(&self.records)
                .iter()
                .find(|r| r.run_id == run_id && r.step_id == step_id)
                .cloned())
        })
    }

    fn steps_for_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<StepRecord>>> {
        Box::pin(async move {
            self.check()?;
            Ok(lock(&self.records)
                .iter()
                .filter(|r| r.run_id == run_id)
                .cloned()
                .collect())
        })
    }

    fn purge_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.check()?;
            let mut records = lock(&self.records);
            let before = records.len();
            records.retain(|r| r.run_id != run_id);
            Ok((before - records.len()) as u64)
        })
    }
}

/// In-memory timer store.
#[derive(Default)]
pub struct MemoryTimers {
    timers: Mutex<Vec<TimerEntry>>,
    unavailable: AtomicBool,
    claimed: AtomicUsize,
}

impl MemoryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All pending timers.
    pub fn pending(&self) -> Vec<TimerEntry> {
        lock(&self.timers).clone()
    }

    /// Total number of entries ever handed out by `claim_due`.
    pub fn claimed_count(&self) -> usize {
        self.claimed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GoflowError::Store("timer store unavailable".into()));
        }
        Ok(())
    }
}

impl TimerStore for MemoryTimers {
    fn schedule(&self, entry: TimerEntry) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            self.check()?;
            let mut timers = lock(&self.timers);
            if timers
                .iter()
                .any(|t| t.run_id == entry.run_id && t.timer_id == entry.timer_id)
            {
                return Ok(false);
            }
            timers.push(entry);
            Ok(true)
        })
    }

    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<TimerEntry>>> {
        Box::pin(async move {
            self.check()?;
            let mut timers = lock(&self.timers);
            let mut due: Vec<TimerEntry> = Vec::new();
            timers.retain(|t| {
                if due.len() < limit && t.is_due(now) {
                    due.push(t.clone());
                    false
                } else {
                    true
                }
            });
            self.claimed.fetch_add(due.len(), Ordering::SeqCst);
            Ok(due)
        })
    }

    fn cancel(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.check()?;
            let mut timers = lock(&self.timers);
            let before = timers.len();
            timers.retain(|t| t.run_id != run_id);
            Ok((before - timers.len()) as u64)
        })
    }

    fn pending_for(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<TimerEntry>>> {
        Box::pin(async move {
            self.check()?;
            Ok(lock(&self.timers)
                .iter()
                .filter(|t| t.run_id == run_id)
                .cloned()
                .collect())
        })
    }
}

/// In-memory run store.
#[derive(Default)]
pub struct MemoryRuns {
    runs: Mutex<HashMap<Uuid, WorkflowRun>>,
    inserts: AtomicUsize,
}

impl MemoryRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a run.
    pub fn run(&self, run_id: Uuid) -> Option<WorkflowRun> {
        lock(&self.runs).get(&run_id).cloned()
    }

    /// Overwrite a run, e.g. to simulate a crash mid-transition.
    pub fn put(&self, run: WorkflowRun) {
        lock(&self.runs).insert(run.run_id, run);
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of runs created through `insert_if_absent`.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

impl RunStore for MemoryRuns {
    fn insert_if_absent(&self, run: WorkflowRun) -> BoxFuture<'_, Result<(WorkflowRun, bool)>> {
        Box::pin(async move {
            let mut runs = lock(&self.runs);
            if let Some(existing) = runs.get(&run.run_id) {
                return Ok((existing.clone(), false));
            }
            runs.insert(run.run_id, run.clone());
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok((run, true))
        })
    }

    fn get(&self, run_id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowRun>>> {
        Box::pin(async move { Ok(lock(&self.runs).get(&run_id).cloned()) })
    }

    fn transition(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut runs = lock(&self.runs);
            let Some(run) = runs.get_mut(&run_id) else {
                return Ok(false);
            };
            if run.status.is_terminal() {
                return Ok(false);
            }
            run.status = status;
            if error.is_some() {
                run.last_error = error;
            }
            run.updated_at = now;
            Ok(true)
        })
    }

    fn stale(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<WorkflowRun>>> {
        Box::pin(async move {
            let mut stale: Vec<WorkflowRun> = lock(&self.runs)
                .values()
                .filter(|r| !r.status.is_terminal() && r.updated_at < before)
                .cloned()
                .collect();
            stale.sort_by_key(|r| r.updated_at);
            stale.truncate(limit);
            Ok(stale)
        })
    }

    fn purge_finished(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<Uuid>>> {
        Box::pin(async move {
            let mut runs = lock(&self.runs);
            let ids: Vec<Uuid> = runs
                .values()
                .filter(|r| r.status.is_terminal() && r.updated_at < before)
                .map(|r| r.run_id)
                .take(limit)
                .collect();
            for id in &ids {
                runs.remove(id);
            }
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{EventType, Trigger};

    fn run_at(now: DateTime<Utc>) -> WorkflowRun {
        let trigger = Trigger {
            trigger_id: Uuid::new_v4().to_string(),
            event_type: EventType::UserCreated,
            payload: serde_json::json!({}),
            received_at: now,
        };
        WorkflowRun::new(&trigger, "sync-user-from-clerk", now)
    }

    #[tokio::test]
    async fn test_ledger_compare_and_set() {
        let ledger = MemoryLedger::new();
        let run_id = Uuid::new_v4();
        let now = Utc::now();

        let first = ledger
            .record_step(StepRecord::new(run_id, "a", serde_json::json!(1), now))
            .await
            .unwrap();
        let second = ledger
            .record_step(StepRecord::new(run_id, "a", serde_json::json!(2), now))
            .await
            .unwrap();

        assert!(first.won);
        assert!(!second.won);
        assert_eq!(second.record.result, serde_json::json!(1));
        assert_eq!(ledger.write_count(), 1);
    }

    #[test]
    fn test_ledger_unavailable() {
        let ledger = MemoryLedger::new();
        ledger.set_unavailable(true);
        let err = tokio_test::assert_err!(tokio_test::block_on(
            ledger.get_step(Uuid::new_v4(), "a")
        ));
        assert!(err.is_store_unavailable());

        ledger.set_unavailable(false);
        tokio_test::assert_ok!(tokio_test::block_on(ledger.get_step(Uuid::new_v4(), "a")));
    }

    #[tokio::test]
    async fn test_timers_claim_once() {
        let timers = MemoryTimers::new();
        let now = Utc::now();
        let run_id = Uuid::new_v4();
        let entry = TimerEntry::new(run_id, "wait", now, now);

        assert!(timers.schedule(entry.clone()).await.unwrap());
        assert!(!timers.schedule(entry).await.unwrap());

        let future = TimerEntry::new(Uuid::new_v4(), "wait", now + chrono::Duration::hours(1), now);
        timers.schedule(future).await.unwrap();

        let claimed = timers.claim_due(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].run_id, run_id);
        assert!(timers.claim_due(now, 10).await.unwrap().is_empty());
        assert_eq!(timers.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_runs_terminal_is_final() {
        let runs = MemoryRuns::new();
        let now = Utc::now();
        let run = run_at(now);
        let run_id = run.run_id;

        let (_, created) = runs.insert_if_absent(run.clone()).await.unwrap();
        assert!(created);
        let (_, created) = runs.insert_if_absent(run).await.unwrap();
        assert!(!created);

        assert!(runs
            .transition(run_id, RunStatus::Cancelled, Some("task deleted".into()), now)
            .await
            .unwrap());
        assert!(!runs
            .transition(run_id, RunStatus::Running, None, now)
            .await
            .unwrap());
        let run = runs.run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.last_error.as_deref(), Some("task deleted"));
    }

    #[tokio::test]
    async fn test_runs_stale_and_purge() {
        let runs = MemoryRuns::new();
        let old = Utc::now() - chrono::Duration::days(40);
        let stuck = run_at(old);
        let mut finished = run_at(old);
        finished.status = RunStatus::Completed;
        runs.put(stuck.clone());
        runs.put(finished.clone());

        let stale = runs.stale(Utc::now(), 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].run_id, stuck.run_id);

        let purged = runs.purge_finished(Utc::now(), 10).await.unwrap();
        assert_eq!(purged, vec![finished.run_id]);
        assert_eq!(runs.len(), 1);
    }
}
