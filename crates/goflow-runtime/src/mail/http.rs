use std::time::Duration;

use serde::Serialize;

use goflow_core::config::MailConfig;
use goflow_core::error::{GoflowError, Result};
use goflow_core::notify::{EmailMessage, MailError, Mailer};
use goflow_core::workflow::BoxFuture;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| GoflowError::Config("mail.endpoint is required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GoflowError::Config(format!("Failed to build mail client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }

    async fn deliver(&self, message: &EmailMessage) -> std::result::Result<(), MailError> {
        if message.to.trim().is_empty() {
            return Err(MailError::InvalidMessage("recipient is empty".into()));
        }

        let body = SendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Email delivered");
        Ok(())
    }
}

impl Mailer for HttpMailer {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, std::result::Result<(), MailError>> {
        Box::pin(async move { self.deliver(&message).await })
    }
}
