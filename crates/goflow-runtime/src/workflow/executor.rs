use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use goflow_core::clock::Clock;
use goflow_core::error::{GoflowError, Result, StepError};
use goflow_core::store::{RunStore, StepLedger, TimerStore};
use goflow_core::workflow::{
    BoxFuture, Instruction, Recorded, RetryPolicy, RunStatus, SleepRecord, StepContext,
    StepRecord, TimerEntry, WorkflowDefinition, WorkflowRun,
};

use super::registry::WorkflowRegistry;

/// Result of driving a run as far as it can go.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every instruction ran, or a guard ended the run early.
    Completed,
    /// The run is parked on a timer.
    Suspended { fire_at: DateTime<Utc> },
    /// A step failed terminally or ran out of retries.
    Failed { error: String },
    /// Nothing was done; the run was already in `status`.
    Skipped { status: RunStatus },
}

/// Everything retained about a run, for operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run: WorkflowRun,
    pub steps: Vec<StepRecord>,
    pub pending_timers: Vec<TimerEntry>,
}

/// How execution of a run was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// First execution or replay of a running run.
    Fresh,
    /// Replay of a run that was suspended and lost its timer.
    WasSuspended,
}

/// Drives workflow runs through their definitions.
///
/// Completed instructions are replayed from the step ledger; new ones run
/// and are recorded before the next instruction starts.
pub struct WorkflowExecutor {
    registry: Arc<WorkflowRegistry>,
    ledger: Arc<dyn StepLedger>,
    timers: Arc<dyn TimerStore>,
    runs: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        ledger: Arc<dyn StepLedger>,
        timers: Arc<dyn TimerStore>,
        runs: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            ledger,
            timers,
            runs,
            clock,
            retry,
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Execute a newly admitted run from its first instruction.
    pub async fn start(&self, run_id: Uuid) -> Result<RunOutcome> {
        let run = self.load(run_id).await?;
        if run.status.is_terminal() {
            return Ok(RunOutcome::Skipped { status: run.status });
        }
        self.execute(run, 0, Entry::Fresh).await
    }

    /// Continue a run after its timer was claimed.
    ///
    /// A run that became terminal while suspended is left alone.
    pub async fn resume(&self, timer: TimerEntry) -> Result<RunOutcome> {
        let run = self.load(timer.run_id).await?;
        if run.status.is_terminal() {
            tracing::info!(
                run_id = %run.run_id,
                status = %run.status,
                "Ignoring timer for finished run"
            );
            return Ok(RunOutcome::Skipped { status: run.status });
        }

        let Some(definition) = self.registry.get_by_id(&run.definition_id) else {
            return self
                .fail(run.run_id, format!("unknown workflow {}", run.definition_id))
                .await;
        };
        let Some(position) = definition.position(&timer.timer_id) else {
            return self
                .fail(
                    run.run_id,
                    format!("workflow {} has no suspend point {}", definition.id(), timer.timer_id),
                )
                .await;
        };

        let now = self.clock.now();
        let woke = self
            .record(
                run.run_id,
                &timer.timer_id,
                serde_json::to_value(SleepRecord::woke(timer.fire_at, now))?,
            )
            .await?;
        if !woke.won {
            tracing::warn!(
                run_id = %run.run_id,
                step = %timer.timer_id,
                "Suspend point already passed by another worker"
            );
            return Ok(RunOutcome::Skipped { status: run.status });
        }

        self.runs
            .transition(run.run_id, RunStatus::Running, None, now)
            .await?;
        tracing::info!(
            run_id = %run.run_id,
            definition = definition.id(),
            step = %timer.timer_id,
            fire_at = %timer.fire_at,
            "Resuming workflow after timer"
        );

        self.execute(run, position + 1, Entry::Fresh).await
    }

    /// Replay an abandoned run from the beginning, reusing recorded steps.
    ///
    /// A run with a pending timer is left suspended for the scheduler, even
    /// when the process died between scheduling the timer and suspending.
    pub async fn recover(&self, run_id: Uuid) -> Result<RunOutcome> {
        let run = self.load(run_id).await?;
        if run.status.is_terminal() {
            return Ok(RunOutcome::Skipped { status: run.status });
        }

        let pending = self.timers.pending_for(run_id).await?;
        if let Some(fire_at) = pending.iter().map(|t| t.fire_at).min() {
            self.runs
                .transition(run_id, RunStatus::Suspended, None, self.clock.now())
                .await?;
            return Ok(RunOutcome::Suspended { fire_at });
        }

        let entry = if run.status == RunStatus::Suspended {
            Entry::WasSuspended
        } else {
            Entry::Fresh
        };

        tracing::info!(
            run_id = %run_id,
            definition = %run.definition_id,
            status = %run.status,
            "Recovering workflow"
        );
        self.execute(run, 0, entry).await
    }

    /// Cancel a run and drop its pending timers.
    ///
    /// Returns false if the run had already finished.
    pub async fn cancel(&self, run_id: Uuid, reason: &str) -> Result<bool> {
        let run = self.load(run_id).await?;
        let cancelled = self
            .runs
            .transition(
                run_id,
                RunStatus::Cancelled,
                Some(reason.to_string()),
                self.clock.now(),
            )
            .await?;

        if !cancelled {
            tracing::debug!(run_id = %run_id, status = %run.status, "Run already finished");
            return Ok(false);
        }

        let removed = self.timers.cancel(run_id).await?;
        tracing::info!(
            run_id = %run_id,
            definition = %run.definition_id,
            timers_removed = removed,
            reason = reason,
            "Workflow cancelled"
        );
        Ok(true)
    }

    /// Load a run with its step records and pending timers.
    ///
    /// Steps are ordered by their position in the definition.
    pub async fn inspect(&self, run_id: Uuid) -> Result<RunReport> {
        let run = self.load(run_id).await?;
        let mut steps = self.ledger.steps_for_run(run_id).await?;
        if let Some(definition) = self.registry.get_by_id(&run.definition_id) {
            steps.sort_by_key(|s| definition.position(&s.step_id).unwrap_or(usize::MAX));
        }
        let pending_timers = self.timers.pending_for(run_id).await?;
        Ok(RunReport {
            run,
            steps,
            pending_timers,
        })
    }

    async fn load(&self, run_id: Uuid) -> Result<WorkflowRun> {
        self.runs
            .get(run_id)
            .await?
            .ok_or_else(|| GoflowError::NotFound(format!("workflow run {}", run_id)))
    }

    async fn execute(&self, run: WorkflowRun, from: usize, entry: Entry) -> Result<RunOutcome> {
        let run_id = run.run_id;
        let Some(definition) = self.registry.get_by_id(&run.definition_id) else {
            return self
                .fail(run_id, format!("unknown workflow {}", run.definition_id))
                .await;
        };
        let policy = definition
            .retry_policy()
            .cloned()
            .unwrap_or_else(|| self.retry.clone());

        let trigger = Arc::new(run.trigger());
        let mut results: HashMap<String, serde_json::Value> = self
            .ledger
            .steps_for_run(run_id)
            .await?
            .into_iter()
            .map(|r| (r.step_id, r.result))
            .collect();

        for instruction in definition.instructions().iter().skip(from) {
            // Cancellation may land between instructions.
            let status = self.load(run_id).await?.status;
            if status.is_terminal() {
                tracing::info!(run_id = %run_id, status = %status, "Run finished elsewhere, stopping");
                return Ok(RunOutcome::Skipped { status });
            }

            let step_id = instruction.id();
            if let Some(result) = self.replay(run_id, step_id, &mut results).await? {
                if let Instruction::Guard { .. } = instruction {
                    if !guard_passed(&result) {
                        return self.complete(run_id, &definition, Some(step_id)).await;
                    }
                }
                continue;
            }

            let base = StepContext::new(
                run_id,
                definition.id(),
                trigger.clone(),
                Arc::new(results.clone()),
            );

            match instruction {
                Instruction::Step { handler, .. } => {
                    let output = match self.attempt(&base, step_id, &policy, handler).await {
                        Ok(output) => output,
                        Err(e) => return self.step_failed(run_id, step_id, e).await,
                    };
                    let recorded = self.record(run_id, step_id, output).await?;
                    tracing::info!(
                        run_id = %run_id,
                        definition = definition.id(),
                        step = step_id,
                        "Step completed"
                    );
                    results.insert(step_id.to_string(), recorded.record.result);
                }
                Instruction::Guard { check, .. } => {
                    let proceed = match self.attempt(&base, step_id, &policy, check).await {
                        Ok(proceed) => proceed,
                        Err(e) => return self.step_failed(run_id, step_id, e).await,
                    };
                    let recorded = self
                        .record(run_id, step_id, serde_json::json!({ "proceed": proceed }))
                        .await?;
                    let result = recorded.record.result;
                    if !guard_passed(&result) {
                        return self.complete(run_id, &definition, Some(step_id)).await;
                    }
                    results.insert(step_id.to_string(), result);
                }
                Instruction::SleepUntil { deadline, .. } => {
                    let now = self.clock.now();
                    let ctx = base.for_attempt(step_id, 1, now);
                    let fire_at = match deadline(&ctx) {
                        Ok(fire_at) => fire_at,
                        Err(e) => return self.step_failed(run_id, step_id, e).await,
                    };

                    if let Some(fire_at) = fire_at.filter(|at| *at > now) {
                        return self.suspend(run_id, &definition, step_id, fire_at, now).await;
                    }

                    // Deadline absent or already passed: no timer.
                    let record = match (entry, fire_at) {
                        (Entry::WasSuspended, Some(at)) => SleepRecord::woke(at, now),
                        _ => SleepRecord::skipped(fire_at, now),
                    };
                    tracing::info!(
                        run_id = %run_id,
                        step = step_id,
                        slept = record.slept,
                        "Deadline not in the future, continuing without suspending"
                    );
                    let recorded = self
                        .record(run_id, step_id, serde_json::to_value(record)?)
                        .await?;
                    results.insert(step_id.to_string(), recorded.record.result);
                }
            }
        }

        self.complete(run_id, &definition, None).await
    }

    /// Reuse a recorded result if the ledger has one.
    async fn replay(
        &self,
        run_id: Uuid,
        step_id: &str,
        results: &mut HashMap<String, serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        if let Some(result) = results.get(step_id) {
            tracing::debug!(run_id = %run_id, step = step_id, "Replaying recorded step");
            return Ok(Some(result.clone()));
        }

        match self.ledger.get_step(run_id, step_id).await? {
            Some(record) => {
                tracing::debug!(run_id = %run_id, step = step_id, "Replaying recorded step");
                results.insert(step_id.to_string(), record.result.clone());
                Ok(Some(record.result))
            }
            None => Ok(None),
        }
    }

    /// Run a handler, retrying transient failures with backoff.
    async fn attempt<T>(
        &self,
        base: &StepContext,
        step_id: &str,
        policy: &RetryPolicy,
        handler: &Arc<
            dyn Fn(StepContext) -> BoxFuture<'static, std::result::Result<T, StepError>>
                + Send
                + Sync,
        >,
    ) -> std::result::Result<T, StepError> {
        let mut attempt = 1;
        loop {
            let ctx = base.for_attempt(step_id, attempt, self.clock.now());
            match handler(ctx).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && policy.allows_retry(attempt) => {
                    let delay = policy.calculate_backoff(attempt);
                    tracing::warn!(
                        run_id = %base.run_id,
                        step = step_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Compare-and-set a step result into the ledger.
    async fn record(
        &self,
        run_id: Uuid,
        step_id: &str,
        result: serde_json::Value,
    ) -> Result<Recorded> {
        let recorded = self
            .ledger
            .record_step(StepRecord::new(run_id, step_id, result, self.clock.now()))
            .await?;
        if !recorded.won {
            tracing::warn!(
                run_id = %run_id,
                step = step_id,
                "Step recorded concurrently, using existing result"
            );
        }
        Ok(recorded)
    }

    async fn suspend(
        &self,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        step_id: &str,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        self.timers
            .schedule(TimerEntry::new(run_id, step_id, fire_at, now))
            .await?;

        if !self
            .runs
            .transition(run_id, RunStatus::Suspended, None, now)
            .await?
        {
            // Cancelled while we were scheduling.
            self.timers.cancel(run_id).await?;
            let status = self.load(run_id).await?.status;
            return Ok(RunOutcome::Skipped { status });
        }

        tracing::info!(
            run_id = %run_id,
            definition = definition.id(),
            step = step_id,
            fire_at = %fire_at,
            "Workflow suspended"
        );
        Ok(RunOutcome::Suspended { fire_at })
    }

    async fn complete(
        &self,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        stopped_at: Option<&str>,
    ) -> Result<RunOutcome> {
        let now = self.clock.now();
        if !self
            .runs
            .transition(run_id, RunStatus::Completed, None, now)
            .await?
        {
            let status = self.load(run_id).await?.status;
            return Ok(RunOutcome::Skipped { status });
        }

        match stopped_at {
            Some(guard) => tracing::info!(
                run_id = %run_id,
                definition = definition.id(),
                step = guard,
                "Guard declined, workflow completed"
            ),
            None => tracing::info!(
                run_id = %run_id,
                definition = definition.id(),
                "Workflow completed"
            ),
        }
        Ok(RunOutcome::Completed)
    }

    async fn step_failed(&self, run_id: Uuid, step_id: &str, error: StepError) -> Result<RunOutcome> {
        match error {
            // The run stays where it is and is retried once the store is back.
            StepError::Store(msg) => Err(GoflowError::Store(msg)),
            other => self.fail(run_id, format!("step {}: {}", step_id, other)).await,
        }
    }

    async fn fail(&self, run_id: Uuid, error: String) -> Result<RunOutcome> {
        let failed = self
            .runs
            .transition(run_id, RunStatus::Failed, Some(error.clone()), self.clock.now())
            .await?;
        if !failed {
            let status = self.load(run_id).await?.status;
            return Ok(RunOutcome::Skipped { status });
        }

        tracing::error!(run_id = %run_id, error = %error, "Workflow failed");
        Ok(RunOutcome::Failed { error })
    }
}

fn guard_passed(result: &serde_json::Value) -> bool {
    result
        .get("proceed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
