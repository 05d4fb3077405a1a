use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use goflow_core::error::Result;
use goflow_core::store::TimerStore;
use goflow_core::workflow::{BoxFuture, TimerEntry};

use super::store_err;

type TimerRow = (Uuid, String, DateTime<Utc>, serde_json::Value, DateTime<Utc>);

fn entry_from_row((run_id, timer_id, fire_at, payload, created_at): TimerRow) -> TimerEntry {
    TimerEntry {
        run_id,
        timer_id,
        fire_at,
        payload,
        created_at,
    }
}

/// Timer store backed by `goflow_timers`.
#[derive(Clone)]
pub struct PgTimerStore {
    pool: PgPool,
}

impl PgTimerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TimerStore for PgTimerStore {
    fn schedule(&self, entry: TimerEntry) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO goflow_timers (run_id, timer_id, fire_at, payload, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (run_id, timer_id) DO NOTHING
                "#,
            )
            .bind(entry.run_id)
            .bind(&entry.timer_id)
            .bind(entry.fire_at)
            .bind(&entry.payload)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<TimerEntry>>> {
        Box::pin(async move {
            // Claim and delete in one statement; SKIP LOCKED keeps concurrent
            // schedulers off each other's rows.
            let rows: Vec<TimerRow> = sqlx::query_as(
                r#"
                DELETE FROM goflow_timers
                WHERE (run_id, timer_id) IN (
                    SELECT run_id, timer_id FROM goflow_timers
                    WHERE fire_at <= $1
                    ORDER BY fire_at ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING run_id, timer_id, fire_at, payload, created_at
                "#,
            )
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(rows.into_iter().map(entry_from_row).collect())
        })
    }

    fn cancel(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM goflow_timers WHERE run_id = $1")
                .bind(run_id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
            Ok(result.rows_affected())
        })
    }

    fn pending_for(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<TimerEntry>>> {
        Box::pin(async move {
            let rows: Vec<TimerRow> = sqlx::query_as(
                r#"
                SELECT run_id, timer_id, fire_at, payload, created_at
                FROM goflow_timers
                WHERE run_id = $1
                ORDER BY fire_at ASC
                "#,
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(rows.into_iter().map(entry_from_row).collect())
        })
    }
}
