use anyhow::Result;
use clap::Parser;
use console::style;

use goflow_runtime::db::Database;
use goflow_runtime::migrations::MigrationRunner;

use super::{init_tracing, load_config};

/// Apply pending database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    /// Configuration file path.
    #[arg(short, long, env = "GOFLOW_CONFIG", default_value = "goflow.toml")]
    pub config: String,
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        init_tracing(&config.observability);

        let db = Database::from_config(&config.database).await?;
        let runner = MigrationRunner::new(db.primary().clone());

        println!();
        println!("  {} Migrations", style("GoFlow").bold().cyan());
        println!();

        let applied = runner.run().await;
        db.close().await;
        let applied = applied?;

        if applied.is_empty() {
            println!("  {} Schema is up to date", style("ℹ").blue());
        } else {
            for name in &applied {
                println!("  {} Applied: {}", style("✓").green(), name);
            }
        }
        println!();

        Ok(())
    }
}
