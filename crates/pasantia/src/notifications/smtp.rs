use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{EmailMessage, NotificationError, Notifier};
use crate::config::SmtpConfig;

/// SMTP delivery through `lettre`.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, from_address: &str) -> Result<Self, NotificationError> {
        let from = parse_mailbox(from_address)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| NotificationError::Transport(format!("SMTP relay error: {err}")))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl Notifier for SmtpNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html_body)
            .map_err(|err| NotificationError::Build(err.to_string()))?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|err| NotificationError::Transport(err.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|err| NotificationError::Address {
            address: address.to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_sender() {
        let config = SmtpConfig {
            host: "smtp.registro.local".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
        };
        assert!(matches!(
            SmtpNotifier::new(&config, "not an address"),
            Err(NotificationError::Address { .. })
        ));
    }

    #[test]
    fn parses_display_name_mailboxes() {
        let mailbox = parse_mailbox("Registro Civil <no-reply@registro-civil.local>")
            .expect("mailbox parses");
        assert_eq!(mailbox.email.to_string(), "no-reply@registro-civil.local");
    }
}
