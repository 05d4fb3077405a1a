//! Assignment email, then a reminder on the due date if the task is still open.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use goflow_core::domain::{TaskDetails, TaskStore};
use goflow_core::error::{Result, StepError};
use goflow_core::notify::{assignment_email, reminder_email, Mailer, TaskMailContext};
use goflow_core::workflow::{EventType, StepContext, WorkflowDefinition};

pub const WORKFLOW_ID: &str = "send-task-assignment-mail";
pub const LOAD_TASK: &str = "load-task";
pub const SEND_ASSIGNMENT: &str = "send-assignment-mail";
pub const WAIT_FOR_DUE_DATE: &str = "wait-for-the-due-date";
pub const CHECK_COMPLETED: &str = "check-if-task-is-completed";
pub const SEND_REMINDER: &str = "send-task-reminder-mail";

/// Payload of `app/task.assigned`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssigned {
    pub task_id: String,
    /// Link included in the emails.
    pub origin: String,
}

/// Result recorded for each sent email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSent {
    pub to: String,
    pub subject: String,
}

pub fn task_assignment(
    tasks: Arc<dyn TaskStore>,
    mailer: Arc<dyn Mailer>,
) -> Result<WorkflowDefinition> {
    let check_tasks = tasks.clone();
    let reminder_tasks = tasks.clone();
    let reminder_mailer = mailer.clone();

    WorkflowDefinition::builder(WORKFLOW_ID, EventType::TaskAssigned)
        // Read-only; safe to re-run.
        .step(LOAD_TASK, move |ctx: StepContext| {
            let tasks = tasks.clone();
            async move {
                let payload: TaskAssigned = ctx.payload_as()?;
                let task = find_task(tasks.as_ref(), &payload.task_id).await?;
                if task.assignee.is_none() {
                    return Err(StepError::terminal(format!(
                        "task {} has no assignee",
                        task.id
                    )));
                }
                Ok::<_, StepError>(task)
            }
        })
        // Not idempotent: a crash after sending but before recording resends once.
        .step(SEND_ASSIGNMENT, move |ctx: StepContext| {
            let mailer = mailer.clone();
            async move {
                let payload: TaskAssigned = ctx.payload_as()?;
                let task: TaskDetails = ctx.result_as(LOAD_TASK)?;
                let message = assignment_email(&mail_context(&task, &payload.origin)?);
                let sent = MailSent {
                    to: message.to.clone(),
                    subject: message.subject.clone(),
                };
                mailer.send(message).await?;
                Ok::<_, StepError>(sent)
            }
        })
        // Recorded once; the timer is keyed by run and step so rescheduling is a no-op.
        .sleep_until(WAIT_FOR_DUE_DATE, |ctx| {
            let task: TaskDetails = ctx.result_as(LOAD_TASK)?;
            Ok(task.due_date)
        })
        // Read-only; safe to re-run.
        .guard(CHECK_COMPLETED, move |ctx: StepContext| {
            let tasks = check_tasks.clone();
            async move {
                if !ctx.slept_at(WAIT_FOR_DUE_DATE) {
                    tracing::debug!(run_id = %ctx.run_id, "Due date had already passed, no reminder");
                    return Ok(false);
                }
                let payload: TaskAssigned = ctx.payload_as()?;
                match tasks.find_task(payload.task_id.clone()).await? {
                    None => {
                        tracing::info!(task_id = %payload.task_id, "Task no longer exists, no reminder");
                        Ok(false)
                    }
                    Some(task) if task.status.is_done() => {
                        tracing::info!(task_id = %payload.task_id, "Task already done, no reminder");
                        Ok(false)
                    }
                    Some(_) => Ok::<_, StepError>(true),
                }
            }
        })
        // Not idempotent: a crash after sending but before recording resends once.
        .step(SEND_REMINDER, move |ctx: StepContext| {
            let tasks = reminder_tasks.clone();
            let mailer = reminder_mailer.clone();
            async move {
                let payload: TaskAssigned = ctx.payload_as()?;
                let task = find_task(tasks.as_ref(), &payload.task_id).await?;
                let message = reminder_email(&mail_context(&task, &payload.origin)?);
                let sent = MailSent {
                    to: message.to.clone(),
                    subject: message.subject.clone(),
                };
                mailer.send(message).await?;
                Ok::<_, StepError>(sent)
            }
        })
        .validate_with::<TaskAssigned>()
        .build()
}

async fn find_task(tasks: &dyn TaskStore, task_id: &str) -> std::result::Result<TaskDetails, StepError> {
    tasks
        .find_task(task_id.to_string())
        .await?
        .ok_or_else(|| StepError::terminal(format!("task {} not found", task_id)))
}

fn mail_context(task: &TaskDetails, origin: &str) -> std::result::Result<TaskMailContext, StepError> {
    let assignee = task
        .assignee
        .as_ref()
        .ok_or_else(|| StepError::terminal(format!("task {} has no assignee", task.id)))?;

    Ok(TaskMailContext {
        task_title: task.title.clone(),
        description: task.description.clone(),
        due_date: task.due_date,
        assignee_name: assignee.name.clone(),
        assignee_email: assignee.email.clone(),
        project_name: task.project_name.clone(),
        origin: origin.to_string(),
    })
}
