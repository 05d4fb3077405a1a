//! In-memory implementations of every engine and collaborator trait.
//!
//! Enabled with the `testing` feature. Engine tests run against these
//! instead of a database.
//!
//! # Example
//!
//! ```ignore
//! let ledger = Arc::new(MemoryLedger::new());
//! let clock = Arc::new(MockClock::new(Utc::now()));
//!
//! ledger.set_unavailable(true);
//! clock.advance(chrono::Duration::days(1));
//! ```

mod clock;
mod domain;
mod mail;
mod memory;

pub use clock::MockClock;
pub use domain::{MemoryDirectory, MemoryTasks};
pub use mail::MockMailer;
pub use memory::{MemoryLedger, MemoryRuns, MemoryTimers};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking test poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
