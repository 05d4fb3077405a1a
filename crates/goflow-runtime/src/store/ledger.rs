use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use goflow_core::error::Result;
use goflow_core::store::StepLedger;
use goflow_core::workflow::{BoxFuture, Recorded, StepRecord};

use super::store_err;

type StepRow = (Uuid, String, serde_json::Value, DateTime<Utc>);

fn record_from_row((run_id, step_id, result, recorded_at): StepRow) -> StepRecord {
    StepRecord {
        run_id,
        step_id,
        result,
        recorded_at,
    }
}

/// Step ledger backed by `goflow_steps`.
///
/// The primary key on `(run_id, step_id)` provides the compare-and-set.
#[derive(Clone)]
pub struct PgStepLedger {
    pool: PgPool,
}

impl PgStepLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl StepLedger for PgStepLedger {
    fn record_step(&self, record: StepRecord) -> BoxFuture<'_, Result<Recorded>> {
        Box::pin(async move {
            let inserted: Option<(Uuid,)> = sqlx::query_as(
                r#"
                INSERT INTO goflow_steps (run_id, step_id, result, recorded_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (run_id, step_id) DO NOTHING
                RETURNING run_id
                "#,
            )
            .bind(record.run_id)
            .bind(&record.step_id)
            .bind(&record.result)
            .bind(record.recorded_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

            if inserted.is_some() {
                return Ok(Recorded { record, won: true });
            }

            let existing = self.get_step(record.run_id, &record.step_id).await?;
            Ok(Recorded {
                record: existing.unwrap_or(record),
                won: false,
            })
        })
    }

    fn get_step<'a>(
        &'a self,
        run_id: Uuid,
        step_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<StepRecord>>> {
        Box::pin(async move {
            let row: Option<StepRow> = sqlx::query_as(
                r#"
                SELECT run_id, step_id, result, recorded_at
                FROM goflow_steps
                WHERE run_id = $1 AND step_id = $2
                "#,
            )
            .bind(run_id)
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(row.map(record_from_row))
        })
    }

    fn steps_for_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<Vec<StepRecord>>> {
        Box::pin(async move {
            let rows: Vec<StepRow> = sqlx::query_as(
                r#"
                SELECT run_id, step_id, result, recorded_at
                FROM goflow_steps
                WHERE run_id = $1
                ORDER BY recorded_at ASC
                "#,
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

            Ok(rows.into_iter().map(record_from_row).collect())
        })
    }

    fn purge_run(&self, run_id: Uuid) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM goflow_steps WHERE run_id = $1")
                .bind(run_id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
            Ok(result.rows_affected())
        })
    }
}


#[cfg(all(test, feature = "embedded-test-db"))]
mod pg_tests {
    use super::super::test_db::{isolated_pool, now, seed_run};
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_record_step_has_one_winner() {
        let pool = isolated_pool().await;
        let run = seed_run(&pool, now()).await;
        let ledger = PgStepLedger::new(pool);

        let writers: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|worker| {
                let ledger = ledger.clone();
                let record = StepRecord::new(
                    run.run_id,
                    "send-task-assignment-mail",
                    serde_json::json!({"sent_by": worker}),
                    now(),
                );
                tokio::spawn(async move { ledger.record_step(record).await })
            })
            .collect();

        let mut results = Vec::new();
        for writer in writers {
            results.push(writer.await.unwrap().unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.won).count(), 1);
        let winner = results.iter().find(|r| r.won).unwrap();
        let loser = results.iter().find(|r| !r.won).unwrap();
        assert_eq!(loser.record.result, winner.record.result);

        let stored = ledger
            .get_step(run.run_id, "send-task-assignment-mail")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.result, winner.record.result);
    }

    #[tokio::test]
    async fn test_steps_for_run_only_returns_that_run() {
        let pool = isolated_pool().await;
        let a = seed_run(&pool, now()).await;
        let b = seed_run(&pool, now()).await;
        let ledger = PgStepLedger::new(pool);

        for step in ["load-task", "send-task-assignment-mail"] {
            ledger
                .record_step(StepRecord::new(a.run_id, step, serde_json::json!(1), now()))
                .await
                .unwrap();
        }
        ledger
            .record_step(StepRecord::new(b.run_id, "load-task", serde_json::json!(2), now()))
            .await
            .unwrap();

        assert_eq!(ledger.steps_for_run(a.run_id).await.unwrap().len(), 2);
        assert_eq!(ledger.purge_run(a.run_id).await.unwrap(), 2);
        assert!(ledger.steps_for_run(a.run_id).await.unwrap().is_empty());
        assert_eq!(ledger.steps_for_run(b.run_id).await.unwrap().len(), 1);
    }
}
