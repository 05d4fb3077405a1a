//! GoFlow service runtime.
//!
//! One process provides:
//! - HTTP gateway for event intake and run inspection
//! - Timer scheduler resuming suspended runs
//! - Recovery and retention sweeps

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use goflow_core::clock::{Clock, SystemClock};
use goflow_core::config::GoflowConfig;
use goflow_core::error::{GoflowError, Result};
use goflow_core::notify::Mailer;
use goflow_runtime::db::Database;
use goflow_runtime::domain::{PgDirectory, PgTaskStore};
use goflow_runtime::gateway::{GatewayServer, GatewayState};
use goflow_runtime::mail::mailer_from_config;
use goflow_runtime::migrations::MigrationRunner;
use goflow_runtime::store::{PgRunStore, PgStepLedger, PgTimerStore};
use goflow_runtime::workflow::{
    EventIngress, WorkflowExecutor, WorkflowScheduler, WorkflowSchedulerConfig,
};

use crate::functions::build_registry;

/// The GoFlow service.
pub struct GoFlow {
    config: GoflowConfig,
    clock: Arc<dyn Clock>,
    mailer: Option<Arc<dyn Mailer>>,
    shutdown: CancellationToken,
}

impl GoFlow {
    /// Create a new builder for configuring GoFlow.
    pub fn builder() -> GoFlowBuilder {
        GoFlowBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &GoflowConfig {
        &self.config
    }

    /// Run until ctrl-c or [`GoFlow::shutdown`].
    pub async fn run(self) -> Result<()> {
        tracing::info!(project = %self.config.project.name, "GoFlow starting");

        let db = Database::from_config(&self.config.database).await?;
        let pool = db.primary().clone();
        tracing::info!("Connected to database");

        if self.config.database.run_migrations {
            let applied = MigrationRunner::new(pool.clone()).run().await?;
            tracing::info!(applied = applied.len(), "Migrations completed");
        }

        let mailer = match self.mailer.clone() {
            Some(mailer) => mailer,
            None => mailer_from_config(&self.config.mail)?,
        };
        let registry = Arc::new(build_registry(
            Arc::new(PgDirectory::new(pool.clone())),
            Arc::new(PgTaskStore::new(pool.clone())),
            mailer,
        )?);

        let ledger = Arc::new(PgStepLedger::new(pool.clone()));
        let timers = Arc::new(PgTimerStore::new(pool.clone()));
        let runs = Arc::new(PgRunStore::new(pool));

        let executor = Arc::new(WorkflowExecutor::new(
            registry.clone(),
            ledger.clone(),
            timers.clone(),
            runs.clone(),
            self.clock.clone(),
            self.config.retry.policy(),
        ));
        let ingress = Arc::new(EventIngress::new(
            registry.clone(),
            runs.clone(),
            executor.clone(),
            self.clock.clone(),
        ));
        let scheduler = WorkflowScheduler::new(
            executor.clone(),
            ledger,
            timers,
            runs,
            self.clock.clone(),
            WorkflowSchedulerConfig::from(&self.config.scheduler),
        );
        let gateway = GatewayServer::new(
            self.config.gateway.clone(),
            GatewayState {
                ingress,
                executor,
                db: db.clone(),
            },
        );

        let mut handles = Vec::new();

        let token = self.shutdown.child_token();
        handles.push(tokio::spawn(async move {
            scheduler.run(token).await;
        }));
        tracing::info!("Workflow scheduler started");

        let token = self.shutdown.child_token();
        let addr = gateway.addr();
        handles.push(tokio::spawn(async move {
            if let Err(e) = gateway.run(token).await {
                tracing::error!("Gateway server error: {}", e);
            }
        }));

        tracing::info!(
            workflows = ?registry.ids(),
            gateway = %addr,
            "GoFlow started"
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("Received shutdown notification");
            }
        }

        tracing::info!("Starting graceful shutdown...");
        self.shutdown.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }

        db.close().await;
        tracing::info!("GoFlow stopped");
        Ok(())
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled when the service shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Builder for configuring the GoFlow runtime.
pub struct GoFlowBuilder {
    config: Option<GoflowConfig>,
    clock: Option<Arc<dyn Clock>>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl GoFlowBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            clock: None,
            mailer: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: GoflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this mailer instead of the one built from `[mail]`.
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Build the GoFlow runtime.
    pub fn build(self) -> Result<GoFlow> {
        let config = self
            .config
            .ok_or_else(|| GoflowError::Config("Configuration is required".to_string()))?;

        if config.database.url.is_empty() {
            return Err(GoflowError::Config("database.url is required".to_string()));
        }

        Ok(GoFlow {
            config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            mailer: self.mailer,
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for GoFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
