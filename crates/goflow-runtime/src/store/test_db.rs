//! Embedded PostgreSQL for store tests.
//!
//! One server is started per test binary; every test gets its own database
//! with the full schema applied.

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;

use goflow_core::store::RunStore;
use goflow_core::workflow::{EventType, Trigger, WorkflowRun};

use super::PgRunStore;
use crate::migrations::MigrationRunner;

static EMBEDDED_PG: OnceCell<postgresql_embedded::PostgreSQL> = OnceCell::const_new();

/// Connect to a fresh, migrated database on the shared embedded server.
pub(crate) async fn isolated_pool() -> PgPool {
    let pg = EMBEDDED_PG
        .get_or_init(|| async {
            let mut pg = postgresql_embedded::PostgreSQL::default();
            pg.setup().await.expect("setup embedded postgres");
            pg.start().await.expect("start embedded postgres");
            pg
        })
        .await;

    let db_name = format!("goflow_test_{}", Uuid::new_v4().simple());
    pg.create_database(&db_name)
        .await
        .expect("create test database");

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&pg.settings().url(&db_name))
        .await
        .expect("connect to test database");
    MigrationRunner::new(pool.clone())
        .run()
        .await
        .expect("migrate test database");
    pool
}

/// Postgres keeps microseconds; round so values compare equal after a read.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Insert a running task-assignment run and return it.
pub(crate) async fn seed_run(pool: &PgPool, at: DateTime<Utc>) -> WorkflowRun {
    let trigger = Trigger {
        trigger_id: format!("evt_{}", Uuid::new_v4().simple()),
        event_type: EventType::TaskAssigned,
        payload: serde_json::json!({"taskId": "task_1"}),
        received_at: at,
    };
    let run = WorkflowRun::new(&trigger, "send-task-assignment-mail", at);
    let (run, inserted) = PgRunStore::new(pool.clone())
        .insert_if_absent(run)
        .await
        .expect("insert run");
    assert!(inserted);
    run
}
