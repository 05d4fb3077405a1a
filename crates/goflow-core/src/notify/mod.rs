//! Outbound notifications.

mod template;

pub use template::{assignment_email, escape_html, format_due_date, reminder_email, TaskMailContext};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StepError;
use crate::workflow::BoxFuture;

/// A rendered email, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Failure reported by a mail transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Relay unreachable or timed out.
    #[error("mail transport error: {0}")]
    Transport(String),

    /// Relay answered with a non-success status.
    #[error("mail relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The message itself can never be delivered.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl From<MailError> for StepError {
    fn from(e: MailError) -> Self {
        match e {
            MailError::InvalidMessage(_) => StepError::Terminal(e.to_string()),
            other => StepError::Transient(other.to_string()),
        }
    }
}

/// Outbound email transport.
pub trait Mailer: Send + Sync + 'static {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, Result<(), MailError>>;
}
