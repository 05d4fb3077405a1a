use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use goflow_core::clock::Clock;
use goflow_core::config::SchedulerConfig;
use goflow_core::error::Result;
use goflow_core::store::{RunStore, StepLedger, TimerStore};
use goflow_core::workflow::RunStatus;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::executor::{RunOutcome, WorkflowExecutor};

/// Configuration for the workflow scheduler.
#[derive(Debug, Clone)]
pub struct WorkflowSchedulerConfig {
    /// How often to claim due timers.
    pub poll_interval: Duration,
    /// Maximum timers or runs handled per pass.
    pub batch_size: usize,
    /// A non-terminal run untouched for this long is recovered.
    pub stale_after: Duration,
    /// How often to look for stale and expired runs.
    pub sweep_interval: Duration,
    /// How long finished runs are kept.
    pub retention: Duration,
}

impl Default for WorkflowSchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for WorkflowSchedulerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
            stale_after: Duration::from_secs(config.stale_after_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            retention: Duration::from_secs(u64::from(config.retention_days) * 24 * 60 * 60),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub recovered: usize,
    pub purged: usize,
}

/// Wakes suspended runs when their timers fire and recovers abandoned runs.
///
/// Several schedulers may poll the same store; a timer is only ever
/// claimed by one of them.
pub struct WorkflowScheduler {
    executor: Arc<WorkflowExecutor>,
    ledger: Arc<dyn StepLedger>,
    timers: Arc<dyn TimerStore>,
    runs: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    config: WorkflowSchedulerConfig,
}

impl WorkflowScheduler {
    pub fn new(
        executor: Arc<WorkflowExecutor>,
        ledger: Arc<dyn StepLedger>,
        timers: Arc<dyn TimerStore>,
        runs: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        config: WorkflowSchedulerConfig,
    ) -> Self {
        Self {
            executor,
            ledger,
            timers,
            runs,
            clock,
            config,
        }
    }

    /// Run the scheduler until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            sweep_interval = ?self.config.sweep_interval,
            batch_size = self.config.batch_size,
            "Workflow scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Failed to process due timers");
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Workflow sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Workflow scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Claim due timers and resume their runs. Returns the number claimed.
    pub async fn tick(&self) -> Result<usize> {
        let due = self
            .timers
            .claim_due(self.clock.now(), self.config.batch_size)
            .await?;
        let count = due.len();
        if count == 0 {
            return Ok(0);
        }
        tracing::debug!(count = count, "Resuming workflows with due timers");

        let mut tasks = JoinSet::new();
        for timer in due {
            let executor = self.executor.clone();
            tasks.spawn(async move {
                let run_id = timer.run_id;
                (run_id, executor.resume(timer).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((run_id, Err(e))) => {
                    // The claimed timer is gone; the sweep recovers the run.
                    tracing::error!(run_id = %run_id, error = %e, "Failed to resume workflow");
                }
                Ok((run_id, Ok(outcome))) => {
                    tracing::debug!(run_id = %run_id, outcome = ?outcome, "Timer handled");
                }
                Err(e) => tracing::error!(error = %e, "Resume task panicked"),
            }
        }

        Ok(count)
    }

    /// Recover stale runs and purge finished ones past retention.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let stale_before = cutoff(now, self.config.stale_after);
        for run in self.runs.stale(stale_before, self.config.batch_size).await? {
            match self.executor.recover(run.run_id).await {
                Ok(RunOutcome::Suspended { .. }) if run.status == RunStatus::Suspended => {}
                Ok(outcome) => {
                    report.recovered += 1;
                    tracing::info!(run_id = %run.run_id, outcome = ?outcome, "Recovered stale workflow");
                }
                Err(e) => {
                    tracing::warn!(run_id = %run.run_id, error = %e, "Failed to recover workflow");
                }
            }
        }

        let purge_before = cutoff(now, self.config.retention);
        let purged = self
            .runs
            .purge_finished(purge_before, self.config.batch_size)
            .await?;
        for run_id in &purged {
            self.ledger.purge_run(*run_id).await?;
            self.timers.cancel(*run_id).await?;
        }
        report.purged = purged.len();

        if report != SweepReport::default() {
            tracing::info!(
                recovered = report.recovered,
                purged = report.purged,
                "Workflow sweep finished"
            );
        }
        Ok(report)
    }
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
