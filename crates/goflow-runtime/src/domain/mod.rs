//! PostgreSQL access to the application tables.

mod directory;
mod tasks;

pub use directory::PgDirectory;
pub use tasks::PgTaskStore;
