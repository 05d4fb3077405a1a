use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::lock;
use crate::notify::{EmailMessage, MailError, Mailer};
use crate::workflow::BoxFuture;

/// Mailer that records what it was asked to send.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail_next: AtomicU32,
    attempts: AtomicU32,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Successfully sent messages, in order.
    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }

    /// Messages sent with the given subject.
    pub fn sent_with_subject(&self, subject: &str) -> Vec<EmailMessage> {
        lock(&self.sent)
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of send calls, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Assert that exactly `count` messages went out.
    pub fn assert_sent_count(&self, count: usize) {
        let sent = lock(&self.sent);
        assert_eq!(
            sent.len(),
            count,
            "Expected {} emails, got {}: {:?}",
            count,
            sent.len(),
            sent.iter().map(|m| &m.subject).collect::<Vec<_>>()
        );
    }
}

impl Mailer for MockMailer {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, Result<(), MailError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(MailError::Transport("simulated outage".into()));
            }
            lock(&self.sent).push(message);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ada@example.com".into(),
            subject: "Hello".into(),
            html: "<p>hi</p>".into(),
        }
    }

    #[tokio::test]
    async fn test_mock_mailer_failures() {
        let mailer = MockMailer::new();
        mailer.fail_next(1);

        assert!(mailer.send(message()).await.is_err());
        assert!(mailer.send(message()).await.is_ok());
        assert_eq!(mailer.attempts(), 2);
        mailer.assert_sent_count(1);
        assert_eq!(mailer.sent_with_subject("Hello").len(), 1);
    }
}
