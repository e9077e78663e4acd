//! Applicant notifications for lifecycle transitions.
//!
//! Creation and decision notices are detached: failures are logged and never reach the
//! citizen-facing response. Correction notices are awaited and their failure is returned
//! to the caller.

mod console;
mod smtp;
pub mod templates;

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::MailConfig;
use crate::solicitudes::domain::{Application, ApplicationNumber};

pub use console::LogNotifier;
pub use smtp::SmtpNotifier;
pub use templates::NotificationTemplate;

/// A rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid email address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("unable to build email: {0}")]
    Build(String),
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Outbound mail transport.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        message: EmailMessage,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// Transport chosen at startup: SMTP when a relay is configured, log-only otherwise.
#[derive(Debug, Clone)]
pub enum OutboundMail {
    Smtp(SmtpNotifier),
    Log(LogNotifier),
}

impl OutboundMail {
    pub fn from_config(config: &MailConfig) -> Result<Self, NotificationError> {
        match &config.smtp {
            Some(smtp) => Ok(Self::Smtp(SmtpNotifier::new(smtp, &config.from_address)?)),
            None => {
                info!("no SMTP relay configured; notifications will only be logged");
                Ok(Self::Log(LogNotifier))
            }
        }
    }
}

impl Notifier for OutboundMail {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        match self {
            OutboundMail::Smtp(notifier) => notifier.send(message).await,
            OutboundMail::Log(notifier) => notifier.send(message).await,
        }
    }
}

/// Renders templates for an application and hands them to the transport.
pub struct NotificationService<N> {
    notifier: Arc<N>,
    public_url: String,
}

impl<N> Clone for NotificationService<N> {
    fn clone(&self) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            public_url: self.public_url.clone(),
        }
    }
}

impl<N> NotificationService<N>
where
    N: Notifier + 'static,
{
    pub fn new(notifier: Arc<N>, public_url: impl Into<String>) -> Self {
        Self {
            notifier,
            public_url: public_url.into(),
        }
    }

    /// Link to the citizen status-check page for `number`.
    pub fn status_url(&self, number: &ApplicationNumber) -> String {
        format!("{}/consulta/{}", self.public_url.trim_end_matches('/'), number)
    }

    pub async fn application_created(
        &self,
        application: &Application,
    ) -> Result<(), NotificationError> {
        let template = NotificationTemplate::Created {
            number: application.number.to_string(),
            status_url: self.status_url(&application.number),
        };
        self.deliver(&application.email, template).await
    }

    pub async fn returned_for_correction(
        &self,
        application: &Application,
        comment: &str,
    ) -> Result<(), NotificationError> {
        let template = NotificationTemplate::ReturnedForCorrection {
            number: application.number.to_string(),
            comment: comment.to_string(),
            status_url: self.status_url(&application.number),
        };
        self.deliver(&application.email, template).await
    }

    pub async fn status_updated(
        &self,
        application: &Application,
        comment: Option<&str>,
    ) -> Result<(), NotificationError> {
        let template = NotificationTemplate::StatusUpdated {
            number: application.number.to_string(),
            state_label: application.state.label().to_string(),
            comment: comment.map(str::to_string),
            status_url: self.status_url(&application.number),
        };
        self.deliver(&application.email, template).await
    }

    /// Sends the creation notice on a background task.
    pub fn spawn_created(&self, application: Application) {
        let notifications = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifications.application_created(&application).await {
                warn!(number = %application.number, error = %err, "creation notice not delivered");
            }
        });
    }

    /// Sends the decision notice on a background task.
    pub fn spawn_status_updated(&self, application: Application, comment: Option<String>) {
        let notifications = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifications
                .status_updated(&application, comment.as_deref())
                .await
            {
                warn!(number = %application.number, error = %err, "status notice not delivered");
            }
        });
    }

    async fn deliver(
        &self,
        to: &str,
        template: NotificationTemplate,
    ) -> Result<(), NotificationError> {
        let message = EmailMessage {
            to: to.to_string(),
            subject: template.subject(),
            html_body: template.render(),
        };
        self.notifier.send(message).await.inspect_err(|err| {
            warn!(recipient = %to, error = %err, "notification failed");
        })
    }
}
