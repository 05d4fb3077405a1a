use goflow_core::notify::{EmailMessage, MailError, Mailer};
use goflow_core::workflow::BoxFuture;

/// Transport that logs messages instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, Result<(), MailError>> {
        Box::pin(async move {
            tracing::info!(
                to = %message.to,
                subject = %message.subject,
                bytes = message.html.len(),
                "Email not delivered, no transport configured"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_mailer_always_succeeds() {
        let message = EmailMessage {
            to: "ada@example.com".into(),
            subject: "Reminder for Apollo".into(),
            html: "<p>due</p>".into(),
        };
        tokio_test::assert_ok!(tokio_test::block_on(LogMailer.send(message)));
    }
}
