use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use console::style;

use goflow_runtime::db::Database;
use goflow_runtime::domain::{PgDirectory, PgTaskStore};
use goflow_runtime::mail::LogMailer;
use goflow_runtime::workflow::WorkflowRegistry;

use super::load_config;
use goflow::build_registry;

/// List the registered workflows and their instructions.
#[derive(Parser)]
pub struct WorkflowsCommand {
    /// Configuration file path.
    #[arg(short, long, env = "GOFLOW_CONFIG", default_value = "goflow.toml")]
    pub config: String,
}

impl WorkflowsCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;

        // Nothing is queried; the pool only satisfies the constructors.
        let db = Database::connect_lazy(&config.database)?;
        let pool = db.primary().clone();
        let registry = build_registry(
            Arc::new(PgDirectory::new(pool.clone())),
            Arc::new(PgTaskStore::new(pool)),
            Arc::new(LogMailer),
        )?;

        println!();
        for line in describe(&registry) {
            println!("{}", line);
        }
        println!();
        Ok(())
    }
}

fn describe(registry: &WorkflowRegistry) -> Vec<String> {
    let mut lines = Vec::new();
    for id in registry.ids() {
        let Some(definition) = registry.get_by_id(id) else {
            continue;
        };
        lines.push(format!(
            "  {} {}",
            style(definition.id()).bold().cyan(),
            style(format!("<- {}", definition.event_type())).dim()
        ));
        for instruction in definition.instructions() {
            lines.push(format!(
                "    {} {} {}",
                style("→").dim(),
                instruction.id(),
                style(format!("({})", instruction.kind())).dim()
            ));
        }
    }
    lines
}
