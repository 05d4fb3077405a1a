mod database;
mod observability;

pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GoflowError, Result};
use crate::workflow::{BackoffStrategy, RetryPolicy};

/// Root configuration for goflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoflowConfig {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// HTTP ingress configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Timer polling and maintenance configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Step retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Outbound mail configuration.
    #[serde(default)]
    pub mail: MailConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl GoflowConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GoflowError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;

        toml::from_str(&content)
            .map_err(|e| GoflowError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration with defaults for everything but the database URL.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            project: ProjectConfig::default(),
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            mail: MailConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_project_name")]
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

fn default_project_name() -> String {
    "goflow".to_string()
}

/// HTTP ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often due timers are claimed, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum timers claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// A run untouched for this long is considered abandoned and recovered.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// How often recovery and retention sweeps run, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Finished runs are purged after this many days.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_stale_after() -> u64 {
    15 * 60
}

fn default_sweep_interval() -> u64 {
    5 * 60
}

fn default_retention_days() -> u32 {
    30
}

/// Step retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per step, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff strategy between attempts.
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound on a single delay, in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffStrategy::default(),
            base_delay_ms: default_base_delay(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail relay. Mail is only logged when unset.
    pub endpoint: Option<String>,

    /// Bearer key for the relay.
    pub api_key: Option<String>,

    /// Sender address.
    #[serde(default = "default_from")]
    pub from: String,

    /// Request timeout in seconds.
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from: default_from(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

fn default_from() -> String {
    "GoFlow <no-reply@goflow.local>".to_string()
}

fn default_mail_timeout() -> u64 {
    15
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| GoflowError::Internal(e.to_string()))?;

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    Ok(result)
}
