use chrono::{DateTime, Utc};
use sqlx::PgPool;

use goflow_core::domain::{Assignee, TaskDetails, TaskStore};
use goflow_core::error::Result;
use goflow_core::workflow::BoxFuture;

type TaskRow = (
    String,
    String,
    Option<String>,
    String,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn task_from_row(row: TaskRow) -> Result<TaskDetails> {
    let (
        id,
        title,
        description,
        status,
        due_date,
        assignee_id,
        assignee_name,
        assignee_email,
        project_name,
    ) = row;

    let assignee = match (assignee_id, assignee_email) {
        (Some(id), Some(email)) => Some(Assignee {
            id,
            name: assignee_name.unwrap_or_default(),
            email,
        }),
        _ => None,
    };

    Ok(TaskDetails {
        id,
        title,
        description,
        status: status.parse()?,
        due_date,
        assignee,
        project_name,
    })
}

/// Reads tasks with their assignee and project.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TaskStore for PgTaskStore {
    fn find_task(&self, task_id: String) -> BoxFuture<'_, Result<Option<TaskDetails>>> {
        Box::pin(async move {
            let row: Option<TaskRow> = sqlx::query_as(
                r#"
                SELECT t.id, t.title, t.description, t.status, t.due_date,
                       u.id, u.name, u.email, p.name
                FROM tasks t
                JOIN projects p ON p.id = t.project_id
                LEFT JOIN users u ON u.id = t.assignee_id
                WHERE t.id = $1
                "#,
            )
            .bind(&task_id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(task_from_row).transpose()
        })
    }
}
