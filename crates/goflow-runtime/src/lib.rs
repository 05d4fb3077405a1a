pub mod db;
pub mod domain;
pub mod gateway;
pub mod mail;
pub mod migrations;
pub mod store;
pub mod workflow;

pub use db::Database;
pub use domain::{PgDirectory, PgTaskStore};
pub use gateway::{GatewayServer, GatewayState};
pub use mail::{mailer_from_config, HttpMailer, LogMailer};
pub use migrations::MigrationRunner;
pub use store::{PgRunStore, PgStepLedger, PgTimerStore};
pub use workflow::{
    Admission, EventIngress, RunOutcome, RunReport, WorkflowExecutor, WorkflowRegistry,
    WorkflowScheduler, WorkflowSchedulerConfig,
};
