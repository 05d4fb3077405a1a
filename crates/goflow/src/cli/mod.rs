mod migrate;
mod run;
mod workflows;

pub use migrate::MigrateCommand;
pub use run::RunCommand;
pub use workflows::WorkflowsCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use goflow_core::config::{GoflowConfig, ObservabilityConfig};

/// GoFlow - durable workflows for the GoFlow service
#[derive(Parser)]
#[command(name = "goflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the workflow service.
    Run(RunCommand),

    /// Apply pending database migrations.
    Migrate(MigrateCommand),

    /// List the registered workflows.
    Workflows(WorkflowsCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Migrate(cmd) => cmd.execute().await,
            Commands::Workflows(cmd) => cmd.execute().await,
        }
    }
}

/// Read the configuration file, failing with a hint when it is missing.
pub(crate) fn load_config(path: &str) -> Result<GoflowConfig> {
    if !Path::new(path).exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nPass --config or set GOFLOW_CONFIG.",
            path
        );
    }
    Ok(GoflowConfig::from_file(path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub(crate) fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from(["goflow", "run", "--config", "custom.toml"]).unwrap();
        match cli.command {
            Commands::Run(cmd) => assert_eq!(cmd.config, "custom.toml"),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_parse_migrate() {
        let cli = Cli::try_parse_from(["goflow", "migrate"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_workflows() {
        let cli = Cli::try_parse_from(["goflow", "workflows"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["goflow", "deploy"]).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("does-not-exist.toml").unwrap_err();
        assert!(err.to_string().contains("does-not-exist.toml"));
    }
}
