//! Alert delivery via SMTP.
//!
//! [`EmailNotifier`] wraps the `lettre` async SMTP transport to send one
//! plain-text message to every configured recipient.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use async_trait::async_trait;

use super::{Alert, Notifier};
use crate::error::NotifyError;

/// Default SMTP port for plain relays.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Connection settings for the SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Upgrade the connection with STARTTLS.
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpSettings {
    /// Plain relay on port 25, no authentication.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            starttls: false,
            username: None,
            password: None,
        }
    }
}

/// Sends alerts by email.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    sender: String,
    recipients: Vec<String>,
    smtp: SmtpSettings,
}

impl EmailNotifier {
    pub fn new(sender: impl Into<String>, recipients: Vec<String>, smtp: SmtpSettings) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            smtp,
        }
    }

    /// Builds the message for `alert`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if there are no recipients or an address does
    /// not parse.
    pub fn build_message(&self, alert: &Alert) -> Result<Message, NotifyError> {
        if self.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.sender.parse()?)
            .subject(alert.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.parse()?);
        }

        builder
            .body(alert.body.clone())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if self.smtp.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp.host)
        };
        let mut builder = builder.port(self.smtp.port);

        if let (Some(user), Some(pass)) = (&self.smtp.username, &self.smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let message = self.build_message(alert)?;
        tracing::debug!(subject = %alert.subject, "Sending alert email");

        self.transport()?.send(message).await?;

        tracing::info!(
            recipients = %self.recipients.join(", "),
            subject = %alert.subject,
            "Alert email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn alert() -> Alert {
        Alert {
            subject: "Too many errors in staff-runner".to_string(),
            body: "There has been 6 errors".to_string(),
        }
    }

    #[test]
    fn test_build_message_has_every_recipient() {
        let notifier = EmailNotifier::new(
            "staff-runner@oma.be",
            vec!["a@oma.be".to_string(), "b@oma.be".to_string()],
            SmtpSettings::new("localhost"),
        );
        let message = notifier.build_message(&alert()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("a@oma.be"));
        assert!(raw.contains("b@oma.be"));
        assert!(raw.contains("Subject: Too many errors in staff-runner"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let notifier = EmailNotifier::new(
            "not an address",
            vec!["a@oma.be".to_string()],
            SmtpSettings::new("localhost"),
        );
        assert_matches!(notifier.build_message(&alert()), Err(NotifyError::Address(_)));
    }

    #[test]
    fn test_no_recipients_rejected() {
        let notifier = EmailNotifier::new("x@oma.be", vec![], SmtpSettings::new("localhost"));
        assert_matches!(notifier.build_message(&alert()), Err(NotifyError::NoRecipients));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_error() {
        let mut smtp = SmtpSettings::new("127.0.0.1");
        smtp.port = 1;
        let notifier = EmailNotifier::new("x@oma.be", vec!["a@oma.be".to_string()], smtp);
        assert!(notifier.send(&alert()).await.is_err());
    }
}
