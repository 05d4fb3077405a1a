use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use goflow_core::config::DatabaseConfig;
use goflow_core::error::{GoflowError, Result};

/// Database connection wrapper providing connection pooling.
///
/// Created once at process start and cloned into every component that
/// needs it. Clones share one pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect(&config.url)
            .await
            .map_err(|e| GoflowError::Database(format!("Failed to connect: {}", e)))?;

        tracing::info!(pool_size = config.pool_size, "Database pool created");
        Ok(Self { pool })
    }

    /// Create a pool that connects on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_lazy(&config.url)
            .map_err(|e| GoflowError::Config(format!("Invalid database url: {}", e)))?;
        Ok(Self { pool })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
    }

    /// Get the underlying pool.
    pub fn primary(&self) -> &PgPool {
        &self.pool
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| GoflowError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
