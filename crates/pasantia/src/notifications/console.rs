use tracing::info;

use super::{EmailMessage, NotificationError, Notifier};

/// Writes notifications to the log instead of sending them. Used when no relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html_body.len(),
            "notification logged (mail delivery disabled)"
        );
        Ok(())
    }
}
