//! PostgreSQL implementations of the engine stores.

mod ledger;
mod runs;
mod timers;

#[cfg(all(test, feature = "embedded-test-db"))]
mod test_db;

pub use ledger::PgStepLedger;
pub use runs::PgRunStore;
pub use timers::PgTimerStore;

use goflow_core::error::GoflowError;

/// Any failure to reach the engine tables blocks forward progress.
fn store_err(e: sqlx::Error) -> GoflowError {
    GoflowError::Store(e.to_string())
}
