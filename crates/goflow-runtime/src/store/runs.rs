use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use goflow_core::error::Result;
use goflow_core::store::RunStore;
use goflow_core::workflow::{BoxFuture, RunStatus, WorkflowRun};

use super::store_err;

type RunRow = (
    Uuid,
    String,
    String,
    String,
    serde_json::Value,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const RUN_COLUMNS: &str = "run_id, trigger_id, definition_id, event_type, payload, status, \
                           last_error, received_at, created_at, updated_at";

fn run_from_row(row: RunRow) -> Result<WorkflowRun> {
    let (
        run_id,
        trigger_id,
        definition_id,
        event_type,
        payload,
        status,
        last_error,
        received_at,
        created_at,
        updated_at,
    ) = row;

    Ok(WorkflowRun {
        run_id,
        trigger_id,
        definition_id,
        event_type: event_type.parse()?,
        payload,
        status: status.parse()?,
        last_error,
        received_at,
        created_at,
        updated_at,
    })
}

/// Run store backed by `goflow_runs`.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, run_id: Uuid) -> Result<Option<WorkflowRun>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM goflow_runs WHERE run_id = $1",
            RUN_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(run_from_row).transpose()
    }
}

impl RunStore for PgRunStore {
    fn insert_if_absent(&self, run: WorkflowRun) -> BoxFuture<'_, Result<(WorkflowRun, bool)>> {
        Box::pin(async move {
            let inserted: Option<(Uuid,)> = sqlx::query_as(
                r#"
                INSERT INTO goflow_runs (
                    run_id, trigger_id, definition_id, event_type, payload, status,
                    last_error, received_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT DO NOTHING
                RETURNING run_id
                "#,
            )
            .bind(run.run_id)
            .bind(&run.trigger_id)
            .bind(&run.definition_id)
            .bind(run.event_type.as_str())
            .bind(&run.payload)
            .bind(run.status.as_str())
            .bind(&run.last_error)
            .bind(run.received_at)
            .bind(run.created_at)
            .bind(run.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

            if inserted.is_some() {
                return Ok((run, true));
            }

            match self.fetch(run.run_id).await? {
                Some(existing) => Ok((existing, false)),
                // Lost to a concurrent purge; report the caller's copy.
                None => Ok((run, false)),
            }
        })
    }

    fn get(&self, run_id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowRun>>> {
        Box::pin(self.fetch(run_id))
    }

    fn transition(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE goflow_runs
                SET status = $2, last_error = COALESCE($3, last_error), updated_at = $4
                WHERE run_id = $1
                  AND status NOT IN ('completed', 'failed', 'cancelled')
                "#,
            )
            .bind(run_id)
            .bind(status.as_str())
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn stale(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<WorkflowRun>>> {
        Box::pin(async move {
            let rows: Vec<RunRow> = sqlx::query_as(&format!(
                r#"
                SELECT {}
                FROM goflow_runs
                WHERE status IN ('running', 'suspended') AND updated_at < $1
                ORDER BY updated_at ASC
                LIMIT $2
                "#,
                RUN_COLUMNS
            ))
            .bind(before)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

            rows.into_iter().map(run_from_row).collect()
        })
    }

    fn purge_finished(&self, before: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<Uuid>>> {
        Box::pin(async move {
            // Steps and timers go with the run via ON DELETE CASCADE.
            let rows: Vec<(Uuid,)> = sqlx::query_as(
                r#"
                DELETE FROM goflow_runs
                WHERE run_id IN (
                    SELECT run_id FROM goflow_runs
                    WHERE status IN ('completed', 'failed', 'cancelled') AND updated_at < $1
                    ORDER BY updated_at ASC
                    LIMIT $2
                )
                RETURNING run_id
                "#,
            )
            .bind(before)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(rows.into_iter().map(|(id,)| id).collect())
        })
    }
}


#[cfg(all(test, feature = "embedded-test-db"))]
mod pg_tests {
    use chrono::Duration;

    use goflow_core::store::{StepLedger, TimerStore};
    use goflow_core::workflow::{StepRecord, TimerEntry};

    use super::super::test_db::{isolated_pool, now, seed_run};
    use super::super::{PgStepLedger, PgTimerStore};
    use super::*;

    #[tokio::test]
    async fn test_insert_if_absent_returns_existing_run() {
        let pool = isolated_pool().await;
        let run = seed_run(&pool, now()).await;
        let runs = PgRunStore::new(pool);

        let mut duplicate = run.clone();
        duplicate.payload = serde_json::json!({"taskId": "other"});
        let (stored, inserted) = runs.insert_if_absent(duplicate).await.unwrap();

        assert!(!inserted);
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn test_transition_never_leaves_terminal_status() {
        let pool = isolated_pool().await;
        let run = seed_run(&pool, now()).await;
        let runs = PgRunStore::new(pool);

        assert!(runs
            .transition(run.run_id, RunStatus::Suspended, None, now())
            .await
            .unwrap());
        assert!(runs
            .transition(run.run_id, RunStatus::Completed, None, now())
            .await
            .unwrap());

        for status in [RunStatus::Running, RunStatus::Suspended, RunStatus::Failed] {
            assert!(!runs
                .transition(run.run_id, status, Some("late".into()), now())
                .await
                .unwrap());
        }

        let stored = runs.get(run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert!(stored.last_error.is_none());
    }

    #[tokio::test]
    async fn test_stale_skips_finished_and_fresh_runs() {
        let pool = isolated_pool().await;
        let start = now();
        let old = seed_run(&pool, start - Duration::hours(1)).await;
        let done = seed_run(&pool, start - Duration::hours(1)).await;
        seed_run(&pool, start).await;
        let runs = PgRunStore::new(pool);
        runs.transition(done.run_id, RunStatus::Completed, None, start - Duration::hours(1))
            .await
            .unwrap();

        let stale = runs.stale(start - Duration::minutes(5), 10).await.unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].run_id, old.run_id);
    }

    #[tokio::test]
    async fn test_purge_removes_steps_and_timers() {
        let pool = isolated_pool().await;
        let start = now();
        let finished = seed_run(&pool, start - Duration::days(10)).await;
        let active = seed_run(&pool, start - Duration::days(10)).await;
        let runs = PgRunStore::new(pool.clone());
        let ledger = PgStepLedger::new(pool.clone());
        let timers = PgTimerStore::new(pool);

        for run in [&finished, &active] {
            ledger
                .record_step(StepRecord::new(run.run_id, "load-task", serde_json::json!(1), start))
                .await
                .unwrap();
            timers
                .schedule(TimerEntry::new(
                    run.run_id,
                    "wait-for-the-due-date",
                    start + Duration::days(1),
                    start,
                ))
                .await
                .unwrap();
        }
        runs.transition(
            finished.run_id,
            RunStatus::Cancelled,
            Some("task deleted".into()),
            start - Duration::days(8),
        )
        .await
        .unwrap();

        let purged = runs.purge_finished(start - Duration::days(7), 10).await.unwrap();

        assert_eq!(purged, vec![finished.run_id]);
        assert!(runs.get(finished.run_id).await.unwrap().is_none());
        assert!(ledger.steps_for_run(finished.run_id).await.unwrap().is_empty());
        assert!(timers.pending_for(finished.run_id).await.unwrap().is_empty());

        assert!(runs.get(active.run_id).await.unwrap().is_some());
        assert_eq!(ledger.steps_for_run(active.run_id).await.unwrap().len(), 1);
        assert_eq!(timers.pending_for(active.run_id).await.unwrap().len(), 1);
    }
}
