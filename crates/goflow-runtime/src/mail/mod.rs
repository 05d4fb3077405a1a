//! Mail transports.

mod http;
mod log;

pub use http::HttpMailer;
pub use log::LogMailer;

use std::sync::Arc;

use goflow_core::config::MailConfig;
use goflow_core::error::Result;
use goflow_core::notify::Mailer;

/// Build the configured transport. Without an endpoint, mail is only logged.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match &config.endpoint {
        Some(_) => Ok(Arc::new(HttpMailer::from_config(config)?)),
        None => {
            tracing::warn!("No mail endpoint configured, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
