//! The workflows this service runs.

pub mod directory;
pub mod task_assignment;

use std::sync::Arc;

use goflow_core::domain::{Directory, TaskStore};
use goflow_core::error::Result;
use goflow_core::notify::Mailer;
use goflow_runtime::workflow::WorkflowRegistry;

/// Register every workflow against its collaborators.
pub fn build_registry(
    directory: Arc<dyn Directory>,
    tasks: Arc<dyn TaskStore>,
    mailer: Arc<dyn Mailer>,
) -> Result<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::new();
    registry.register(directory::sync_user(directory.clone())?)?;
    registry.register(directory::update_user(directory.clone())?)?;
    registry.register(directory::delete_user(directory.clone())?)?;
    registry.register(directory::sync_workspace(directory.clone())?)?;
    registry.register(directory::update_workspace(directory.clone())?)?;
    registry.register(directory::delete_workspace(directory.clone())?)?;
    registry.register(directory::sync_workspace_member(directory)?)?;
    registry.register(task_assignment::task_assignment(tasks, mailer)?)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use goflow_core::domain::{Assignee, TaskDetails, TaskStatus};
    use goflow_core::store::{RunStore, TimerStore};
    use goflow_core::testing::{
        MemoryDirectory, MemoryLedger, MemoryRuns, MemoryTasks, MemoryTimers, MockClock,
        MockMailer,
    };
    use goflow_core::clock::Clock;
    use goflow_core::workflow::{
        run_id_for, BackoffStrategy, EventType, InboundEvent, RetryPolicy, RunStatus, StepRecord,
        Trigger, WorkflowRun,
    };
    use goflow_runtime::workflow::{
        EventIngress, RunOutcome, WorkflowExecutor, WorkflowScheduler, WorkflowSchedulerConfig,
    };

    use super::task_assignment::{
        CHECK_COMPLETED, LOAD_TASK, SEND_ASSIGNMENT, SEND_REMINDER, WAIT_FOR_DUE_DATE,
    };
    use super::*;

    const ORIGIN: &str = "https://app.goflow.dev";

    struct Service {
        ingress: Arc<EventIngress>,
        executor: Arc<WorkflowExecutor>,
        scheduler: WorkflowScheduler,
        directory: Arc<MemoryDirectory>,
        tasks: Arc<MemoryTasks>,
        mailer: Arc<MockMailer>,
        ledger: Arc<MemoryLedger>,
        timers: Arc<MemoryTimers>,
        runs: Arc<MemoryRuns>,
        clock: Arc<MockClock>,
    }

    fn service() -> Service {
        let directory = Arc::new(MemoryDirectory::new());
        let tasks = Arc::new(MemoryTasks::new());
        let mailer = Arc::new(MockMailer::new());
        let registry = Arc::new(
            build_registry(directory.clone(), tasks.clone(), mailer.clone()).unwrap(),
        );

        let ledger = Arc::new(MemoryLedger::new());
        let timers = Arc::new(MemoryTimers::new());
        let runs = Arc::new(MemoryRuns::new());
        let clock = Arc::new(MockClock::new(
            "2026-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        ));
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff: BackoffStrategy::Fixed,
            base_delay: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let executor = Arc::new(WorkflowExecutor::new(
            registry.clone(),
            ledger.clone(),
            timers.clone(),
            runs.clone(),
            clock.clone(),
            retry,
        ));
        let ingress = Arc::new(EventIngress::new(
            registry,
            runs.clone(),
            executor.clone(),
            clock.clone(),
        ));
        let scheduler = WorkflowScheduler::new(
            executor.clone(),
            ledger.clone(),
            timers.clone(),
            runs.clone(),
            clock.clone(),
            WorkflowSchedulerConfig {
                batch_size: 10,
                ..Default::default()
            },
        );

        Service {
            ingress,
            executor,
            scheduler,
            directory,
            tasks,
            mailer,
            ledger,
            timers,
            runs,
            clock,
        }
    }

    fn task(due_date: DateTime<Utc>) -> TaskDetails {
        TaskDetails {
            id: "task_1".into(),
            title: "Ship <release>".into(),
            description: Some("Tag and publish".into()),
            status: TaskStatus::Todo,
            due_date: Some(due_date),
            assignee: Some(Assignee {
                id: "user_1".into(),
                name: "Ada".into(),
                email: "ada@example.com".into(),
            }),
            project_name: "Apollo".into(),
        }
    }

    impl Service {
        fn add_task(&self, due_in: chrono::Duration) -> TaskDetails {
            let task = task(self.clock.now() + due_in);
            self.tasks.insert(task.clone());
            task
        }

        async fn assign(&self, trigger_id: &str) -> (uuid::Uuid, Option<RunOutcome>) {
            let (admission, outcome) = self
                .ingress
                .admit_and_run(InboundEvent::new(
                    trigger_id,
                    EventType::TaskAssigned,
                    serde_json::json!({"taskId": "task_1", "origin": ORIGIN}),
                ))
                .await
                .unwrap();
            (admission.run_id, outcome)
        }

        fn status(&self, run_id: uuid::Uuid) -> RunStatus {
            self.runs.run(run_id).unwrap().status
        }
    }

    #[test]
    fn test_registry_covers_every_event() {
        let registry = build_registry(
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryTasks::new()),
            Arc::new(MockMailer::new()),
        )
        .unwrap();

        for event in EventType::ALL {
            assert!(registry.get(event).is_some(), "{} has no workflow", event);
        }
        assert_eq!(registry.len(), EventType::ALL.len());
    }

    #[tokio::test]
    async fn test_future_due_date_suspends_then_reminds() {
        let svc = service();
        svc.add_task(chrono::Duration::days(3));

        let (run_id, outcome) = svc.assign("evt_assign_1").await;

        assert!(matches!(outcome, Some(RunOutcome::Suspended { .. })));
        assert_eq!(svc.status(run_id), RunStatus::Suspended);
        assert_eq!(
            svc.mailer.sent_with_subject("New Task Assignment in Apollo").len(),
            1
        );
        let pending = svc.timers.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timer_id, WAIT_FOR_DUE_DATE);

        // Not yet due.
        svc.clock.advance(chrono::Duration::days(2));
        assert_eq!(svc.scheduler.tick().await.unwrap(), 0);

        svc.clock.advance(chrono::Duration::days(1) + chrono::Duration::seconds(1));
        assert_eq!(svc.scheduler.tick().await.unwrap(), 1);

        assert_eq!(svc.status(run_id), RunStatus::Completed);
        let reminders = svc.mailer.sent_with_subject("Reminder for Apollo");
        assert_eq!(reminders.len(), 1);
        assert!(reminders[0].html.contains("Ship &lt;release&gt;"));
        assert!(svc.ledger.has_step(run_id, SEND_REMINDER));
    }

    #[tokio::test]
    async fn test_past_due_date_takes_fast_path() {
        let svc = service();
        svc.add_task(-chrono::Duration::hours(1));

        let (run_id, outcome) = svc.assign("evt_assign_2").await;

        assert_eq!(outcome, Some(RunOutcome::Completed));
        assert!(svc.timers.pending().is_empty());
        svc.mailer.assert_sent_count(1);
        assert!(svc.ledger.has_step(run_id, WAIT_FOR_DUE_DATE));
        assert!(svc.ledger.has_step(run_id, CHECK_COMPLETED));
        assert!(!svc.ledger.has_step(run_id, SEND_REMINDER));
    }

    #[tokio::test]
    async fn test_task_done_before_due_date_gets_no_reminder() {
        let svc = service();
        svc.add_task(chrono::Duration::days(1));
        let (run_id, _) = svc.assign("evt_assign_3").await;

        svc.tasks.set_status("task_1", TaskStatus::Done);
        svc.clock.advance(chrono::Duration::days(2));
        svc.scheduler.tick().await.unwrap();

        assert_eq!(svc.status(run_id), RunStatus::Completed);
        assert!(!svc.ledger.has_step(run_id, SEND_REMINDER));
        svc.mailer.assert_sent_count(1);
    }

    #[tokio::test]
    async fn test_crash_before_suspend_still_reminds() {
        let svc = service();
        svc.add_task(chrono::Duration::days(1));
        let (run_id, _) = svc.assign("evt_assign_crash").await;

        // The timer was written but the run never reached Suspended.
        svc.runs
            .transition(run_id, RunStatus::Running, None, svc.clock.now())
            .await
            .unwrap();
        assert_eq!(svc.timers.pending().len(), 1);
        svc.clock.advance(chrono::Duration::days(2));

        let outcome = svc.executor.recover(run_id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Suspended { .. }));
        assert_eq!(svc.scheduler.tick().await.unwrap(), 1);

        assert_eq!(svc.status(run_id), RunStatus::Completed);
        assert_eq!(svc.mailer.sent_with_subject("Reminder for Apollo").len(), 1);
    }

    #[tokio::test]
    async fn test_task_deleted_before_due_date_gets_no_reminder() {
        let svc = service();
        svc.add_task(chrono::Duration::days(1));
        let (run_id, _) = svc.assign("evt_assign_4").await;

        svc.tasks.remove("task_1");
        svc.clock.advance(chrono::Duration::days(2));
        svc.scheduler.tick().await.unwrap();

        assert_eq!(svc.status(run_id), RunStatus::Completed);
        assert!(!svc.ledger.has_step(run_id, SEND_REMINDER));
    }

    #[tokio::test]
    async fn test_missing_task_fails_run() {
        let svc = service();
        let (run_id, outcome) = svc.assign("evt_assign_5").await;

        assert!(matches!(outcome, Some(RunOutcome::Failed { .. })));
        assert_eq!(svc.status(run_id), RunStatus::Failed);
        svc.mailer.assert_sent_count(0);
    }

    #[tokio::test]
    async fn test_mail_outage_is_retried() {
        let svc = service();
        svc.add_task(-chrono::Duration::hours(1));
        svc.mailer.fail_next(2);

        let (run_id, outcome) = svc.assign("evt_assign_6").await;

        assert_eq!(outcome, Some(RunOutcome::Completed));
        assert_eq!(svc.mailer.attempts(), 3);
        svc.mailer.assert_sent_count(1);
        assert!(svc.ledger.has_step(run_id, SEND_ASSIGNMENT));
    }

    #[tokio::test]
    async fn test_crash_after_send_does_not_resend() {
        let svc = service();
        let task = svc.add_task(chrono::Duration::days(3));

        // Admitted, loaded and mailed, then the process died.
        let trigger_id = "evt_assign_7";
        let run_id = run_id_for(trigger_id);
        svc.runs
            .insert_if_absent(WorkflowRun::new(
                &Trigger {
                    trigger_id: trigger_id.into(),
                    event_type: EventType::TaskAssigned,
                    payload: serde_json::json!({"taskId": "task_1", "origin": ORIGIN}),
                    received_at: svc.clock.now(),
                },
                super::task_assignment::WORKFLOW_ID,
                svc.clock.now(),
            ))
            .await
            .unwrap();
        svc.ledger.inject(StepRecord::new(
            run_id,
            LOAD_TASK,
            serde_json::to_value(&task).unwrap(),
            svc.clock.now(),
        ));
        svc.ledger.inject(StepRecord::new(
            run_id,
            SEND_ASSIGNMENT,
            serde_json::json!({"to": "ada@example.com", "subject": "New Task Assignment in Apollo"}),
            svc.clock.now(),
        ));

        svc.clock.advance(chrono::Duration::hours(1));
        let report = svc.scheduler.sweep().await.unwrap();

        assert_eq!(report.recovered, 1);
        assert_eq!(svc.status(run_id), RunStatus::Suspended);
        svc.mailer.assert_sent_count(0);
        assert_eq!(svc.tasks.read_count(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_assignment_mail_is_sent_again_once() {
        let svc = service();
        let task = svc.add_task(chrono::Duration::days(3));

        // Loaded and possibly mailed, but the send never reached the ledger.
        let trigger_id = "evt_assign_resend";
        let run_id = run_id_for(trigger_id);
        svc.runs
            .insert_if_absent(WorkflowRun::new(
                &Trigger {
                    trigger_id: trigger_id.into(),
                    event_type: EventType::TaskAssigned,
                    payload: serde_json::json!({"taskId": "task_1", "origin": ORIGIN}),
                    received_at: svc.clock.now(),
                },
                super::task_assignment::WORKFLOW_ID,
                svc.clock.now(),
            ))
            .await
            .unwrap();
        svc.ledger.inject(StepRecord::new(
            run_id,
            LOAD_TASK,
            serde_json::to_value(&task).unwrap(),
            svc.clock.now(),
        ));

        let outcome = svc.executor.recover(run_id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Suspended { .. }));
        assert!(svc.ledger.has_step(run_id, SEND_ASSIGNMENT));

        svc.executor.recover(run_id).await.unwrap();
        svc.mailer.assert_sent_count(1);
    }

    #[tokio::test]
    async fn test_redelivered_trigger_runs_once() {
        let svc = service();
        svc.add_task(chrono::Duration::days(1));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ingress = svc.ingress.clone();
            handles.push(tokio::spawn(async move {
                ingress
                    .admit_and_run(InboundEvent::new(
                        "evt_dup",
                        EventType::TaskAssigned,
                        serde_json::json!({"taskId": "task_1", "origin": ORIGIN}),
                    ))
                    .await
                    .unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().0.created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(svc.runs.len(), 1);
        assert_eq!(svc.timers.pending().len(), 1);
        svc.mailer.assert_sent_count(1);
    }

    #[tokio::test]
    async fn test_timer_is_claimed_once() {
        let svc = service();
        svc.add_task(chrono::Duration::hours(4));
        let (run_id, _) = svc.assign("evt_assign_8").await;

        svc.clock.advance(chrono::Duration::hours(5));
        let first = svc.timers.claim_due(svc.clock.now(), 10).await.unwrap();
        let second = svc.timers.claim_due(svc.clock.now(), 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        svc.executor.resume(first[0].clone()).await.unwrap();
        assert_eq!(svc.status(run_id), RunStatus::Completed);
        assert_eq!(svc.mailer.sent_with_subject("Reminder for Apollo").len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_reminder() {
        let svc = service();
        svc.add_task(chrono::Duration::days(1));
        let (run_id, _) = svc.assign("evt_assign_9").await;

        assert!(svc.executor.cancel(run_id, "task unassigned").await.unwrap());

        assert!(svc.timers.pending().is_empty());
        assert_eq!(svc.status(run_id), RunStatus::Cancelled);
        svc.clock.advance(chrono::Duration::days(2));
        assert_eq!(svc.scheduler.tick().await.unwrap(), 0);
        svc.mailer.assert_sent_count(1);
    }

    #[tokio::test]
    async fn test_workspace_sync_adds_owner_as_admin() {
        let svc = service();
        let (admission, outcome) = svc
            .ingress
            .admit_and_run(InboundEvent::new(
                "evt_org_1",
                EventType::OrganizationCreated,
                serde_json::json!({
                    "id": "org_1",
                    "name": "Apollo",
                    "slug": "apollo",
                    "created_by": "user_1"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Some(RunOutcome::Completed));
        assert!(admission.created);
        assert_eq!(svc.directory.workspace("org_1").unwrap().owner_id, "user_1");
        let members = svc.directory.members("org_1");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, "ADMIN");
    }

    fn org_event(trigger_id: &str, event_type: EventType) -> InboundEvent {
        InboundEvent::new(
            trigger_id,
            event_type,
            serde_json::json!({
                "id": "org_1",
                "name": "Apollo",
                "slug": "apollo",
                "created_by": "user_1"
            }),
        )
    }

    #[tokio::test]
    async fn test_workspace_sync_is_safe_to_replay() {
        let svc = service();
        for trigger_id in ["evt_org_a", "evt_org_b"] {
            let (_, outcome) = svc
                .ingress
                .admit_and_run(org_event(trigger_id, EventType::OrganizationCreated))
                .await
                .unwrap();
            assert_eq!(outcome, Some(RunOutcome::Completed));
        }

        assert_eq!(svc.directory.members("org_1").len(), 1);
    }

    #[tokio::test]
    async fn test_workspace_delete_replay_fails_the_run() {
        let svc = service();
        svc.ingress
            .admit_and_run(org_event("evt_org_c", EventType::OrganizationCreated))
            .await
            .unwrap();

        let (_, first) = svc
            .ingress
            .admit_and_run(org_event("evt_org_del_1", EventType::OrganizationDeleted))
            .await
            .unwrap();
        let (admission, replay) = svc
            .ingress
            .admit_and_run(org_event("evt_org_del_2", EventType::OrganizationDeleted))
            .await
            .unwrap();

        assert_eq!(first, Some(RunOutcome::Completed));
        assert!(svc.directory.workspace("org_1").is_none());
        assert!(matches!(replay, Some(RunOutcome::Failed { .. })));
        assert_eq!(svc.status(admission.run_id), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_invitation_role_is_upper_cased() {
        let svc = service();
        svc.ingress
            .admit_and_run(InboundEvent::new(
                "evt_org_2",
                EventType::OrganizationCreated,
                serde_json::json!({"id": "org_2", "name": "Gemini", "slug": "gemini", "created_by": "user_1"}),
            ))
            .await
            .unwrap();

        let (_, outcome) = svc
            .ingress
            .admit_and_run(InboundEvent::new(
                "evt_inv_1",
                EventType::InvitationAccepted,
                serde_json::json!({"user_id": "user_2", "organization_id": "org_2", "role_name": "member"}),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Some(RunOutcome::Completed));
        assert!(svc
            .directory
            .members("org_2")
            .iter()
            .any(|m| m.user_id == "user_2" && m.role == "MEMBER"));
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let svc = service();
        let user = serde_json::json!({
            "id": "user_9",
            "email_addresses": [{"email_address": "grace@example.com"}],
            "first_name": "Grace",
            "last_name": "Hopper"
        });

        let (_, created) = svc
            .ingress
            .admit_and_run(InboundEvent::new("evt_u1", EventType::UserCreated, user))
            .await
            .unwrap();
        assert_eq!(created, Some(RunOutcome::Completed));
        assert_eq!(svc.directory.user("user_9").unwrap().name, "Grace Hopper");

        let (_, deleted) = svc
            .ingress
            .admit_and_run(InboundEvent::new(
                "evt_u2",
                EventType::UserDeleted,
                serde_json::json!({"id": "user_9"}),
            ))
            .await
            .unwrap();
        assert_eq!(deleted, Some(RunOutcome::Completed));
        assert!(svc.directory.user("user_9").is_none());

        // Deleting again is skipped, not an error.
        let (_, again) = svc
            .ingress
            .admit_and_run(InboundEvent::new(
                "evt_u3",
                EventType::UserDeleted,
                serde_json::json!({"id": "user_9"}),
            ))
            .await
            .unwrap();
        assert_eq!(again, Some(RunOutcome::Completed));

        // Updating a user that is gone fails the run.
        let (_, updated) = svc
            .ingress
            .admit_and_run(InboundEvent::new(
                "evt_u4",
                EventType::UserUpdated,
                serde_json::json!({"id": "user_9", "first_name": "G"}),
            ))
            .await
            .unwrap();
        assert!(matches!(updated, Some(RunOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_not_admitted() {
        let svc = service();
        let result = svc
            .ingress
            .admit(InboundEvent::new(
                "evt_bad",
                EventType::TaskAssigned,
                serde_json::json!({"task": "task_1"}),
            ))
            .await;

        assert!(result.is_err());
        assert!(svc.runs.is_empty());
    }

}
