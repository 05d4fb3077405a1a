use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;

use super::{init_tracing, load_config};
use goflow::GoFlow;

/// Run the workflow service.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, env = "GOFLOW_CONFIG", default_value = "goflow.toml")]
    pub config: String,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Skip migrations on startup.
    #[arg(long)]
    pub no_migrate: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        let mut config = load_config(&self.config)?;
        init_tracing(&config.observability);

        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(host) = self.host.clone() {
            config.gateway.host = host;
        }
        if self.no_migrate {
            config.database.run_migrations = false;
        }

        info!("Loaded configuration from {}", self.config);

        println!();
        println!(
            "  {}  v{}",
            style("GoFlow").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "  {} Accepting events at {}",
            style("→").dim(),
            style(format!(
                "http://{}:{}/events",
                config.gateway.host, config.gateway.port
            ))
            .cyan()
        );
        println!();

        let goflow = GoFlow::builder().config(config).build()?;
        goflow.run().await?;

        println!("\n  {} Stopped", style("✓").green());
        Ok(())
    }
}
