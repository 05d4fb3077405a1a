use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use goflow_core::clock::Clock;
use goflow_core::error::{GoflowError, Result};
use goflow_core::store::RunStore;
use goflow_core::workflow::{InboundEvent, RunStatus, Trigger, WorkflowRun};

use super::executor::{RunOutcome, WorkflowExecutor};
use super::registry::WorkflowRegistry;

/// Result of admitting an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub run_id: Uuid,
    /// False when the trigger was already admitted earlier.
    pub created: bool,
    pub status: RunStatus,
}

/// Turns inbound events into workflow runs, at most one per trigger ID.
pub struct EventIngress {
    registry: Arc<WorkflowRegistry>,
    runs: Arc<dyn RunStore>,
    executor: Arc<WorkflowExecutor>,
    clock: Arc<dyn Clock>,
}

impl EventIngress {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        runs: Arc<dyn RunStore>,
        executor: Arc<WorkflowExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            runs,
            executor,
            clock,
        }
    }

    /// Admit an event and start its run in the background.
    ///
    /// Redeliveries of the same trigger ID return the existing run and
    /// start nothing.
    pub async fn admit(&self, event: InboundEvent) -> Result<Admission> {
        let (run, created) = self.insert(event).await?;

        if created {
            let executor = self.executor.clone();
            let run_id = run.run_id;
            tokio::spawn(async move {
                if let Err(e) = executor.start(run_id).await {
                    // The stale-run sweep picks it up again.
                    tracing::warn!(run_id = %run_id, error = %e, "Workflow start failed");
                }
            });
        }

        Ok(Admission {
            run_id: run.run_id,
            created,
            status: run.status,
        })
    }

    /// Admit an event and drive its run inline until it suspends or finishes.
    pub async fn admit_and_run(&self, event: InboundEvent) -> Result<(Admission, Option<RunOutcome>)> {
        let (run, created) = self.insert(event).await?;
        let outcome = if created {
            Some(self.executor.start(run.run_id).await?)
        } else {
            None
        };

        let status = match self.runs.get(run.run_id).await? {
            Some(current) => current.status,
            None => run.status,
        };
        Ok((
            Admission {
                run_id: run.run_id,
                created,
                status,
            },
            outcome,
        ))
    }

    async fn insert(&self, event: InboundEvent) -> Result<(WorkflowRun, bool)> {
        let now = self.clock.now();
        let trigger = Trigger::from_inbound(event, now)?;
        let definition = self.registry.get(trigger.event_type).ok_or_else(|| {
            GoflowError::Validation(format!("no workflow handles {}", trigger.event_type))
        })?;
        definition.validate(&trigger)?;

        let (run, created) = self
            .runs
            .insert_if_absent(WorkflowRun::new(&trigger, definition.id(), now))
            .await?;

        if created {
            tracing::info!(
                run_id = %run.run_id,
                trigger_id = %trigger.trigger_id,
                definition = definition.id(),
                event_type = %trigger.event_type,
                "Admitted workflow run"
            );
        } else {
            tracing::debug!(
                run_id = %run.run_id,
                trigger_id = %trigger.trigger_id,
                status = %run.status,
                "Duplicate trigger, run already exists"
            );
        }
        Ok((run, created))
    }
}
