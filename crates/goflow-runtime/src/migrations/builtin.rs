//! Embedded schema migrations, applied in order and tracked in
//! `goflow_migrations`.

use super::runner::Migration;

const GOFLOW_INTERNAL_SQL: &str = include_str!("../../migrations/0000_goflow_internal.sql");
const APP_SCHEMA_SQL: &str = include_str!("../../migrations/0001_app_schema.sql");

/// Get all built-in migrations.
pub fn get_builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::new("0000_goflow_internal", GOFLOW_INTERNAL_SQL),
        Migration::new("0001_app_schema", APP_SCHEMA_SQL),
    ]
}
