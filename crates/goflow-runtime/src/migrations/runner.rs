//! Migration runner.
//!
//! Only one process applies migrations at a time, serialized by a
//! PostgreSQL advisory lock.

use std::collections::HashSet;

use goflow_core::error::{GoflowError, Result};
use sqlx::PgPool;
use tracing::{debug, info, warn};

/// Advisory lock key ("GOFLOW" in hex).
const MIGRATION_LOCK_ID: i64 = 0x474F_464C_4F57;

/// A single migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name, e.g. "0000_goflow_internal".
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Applies embedded migrations that have not run yet.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations under the advisory lock.
    ///
    /// Returns the names of the migrations applied by this call.
    pub async fn run(&self) -> Result<Vec<String>> {
        self.acquire_lock().await?;

        let result = self.run_pending().await;

        if let Err(e) = self.release_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn run_pending(&self) -> Result<Vec<String>> {
        self.ensure_migrations_table().await?;

        let applied = self.get_applied_migrations().await?;
        debug!("Already applied migrations: {:?}", applied);

        let mut newly_applied = Vec::new();
        for migration in super::builtin::get_builtin_migrations() {
            if !applied.contains(&migration.name) {
                self.apply_migration(&migration).await?;
                newly_applied.push(migration.name);
            }
        }

        Ok(newly_applied)
    }

    async fn acquire_lock(&self) -> Result<()> {
        debug!("Acquiring migration lock...");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                GoflowError::Database(format!("Failed to acquire migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                GoflowError::Database(format!("Failed to release migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goflow_migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GoflowError::Database(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM goflow_migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                GoflowError::Database(format!("Failed to get applied migrations: {}", e))
            })?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        info!("Applying migration: {}", migration.name);

        let mut tx = self.pool.begin().await.map_err(|e| {
            GoflowError::Database(format!("Failed to begin migration transaction: {}", e))
        })?;

        for statement in split_sql_statements(&migration.sql) {
            if is_comment_only(&statement) {
                continue;
            }

            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    GoflowError::Database(format!(
                        "Failed to apply migration '{}': {}",
                        migration.name, e
                    ))
                })?;
        }

        sqlx::query("INSERT INTO goflow_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                GoflowError::Database(format!(
                    "Failed to record migration '{}': {}",
                    migration.name, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            GoflowError::Database(format!(
                "Failed to commit migration '{}': {}",
                migration.name, e
            ))
        })?;

        info!("Migration applied: {}", migration.name);
        Ok(())
    }
}

fn is_comment_only(statement: &str) -> bool {
    statement.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with("--")
    })
}

/// Split SQL into individual statements, respecting dollar-quoted strings.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut dollar_tag: Option<String> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if c == '$' {
            let mut tag = String::from("$");
            while let Some(&next) = chars.peek() {
                if next == '$' || next.is_alphanumeric() || next == '_' {
                    chars.next();
                    tag.push(next);
                    current.push(next);
                    if next == '$' {
                        break;
                    }
                } else {
                    break;
                }
            }

            if tag.len() >= 2 && tag.ends_with('$') {
                match &dollar_tag {
                    Some(open) if *open == tag => dollar_tag = None,
                    Some(_) => {}
                    None => dollar_tag = Some(tag),
                }
            }
        }

        if c == ';' && dollar_tag.is_none() {
            push_statement(&mut statements, &current);
            current.clear();
        }
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim().trim_end_matches(';').trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}
