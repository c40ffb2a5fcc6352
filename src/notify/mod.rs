//! Operator notification.
//!
//! A single message is sent when the failure counter crosses its threshold.
//! Delivery failures are reported to the caller, which only logs them.

mod email;

use std::path::Path;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use email::{EmailNotifier, SmtpSettings, DEFAULT_SMTP_PORT};

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Message sent when `count` failures accumulated in instance `name`.
    pub fn too_many_errors(
        name: &str,
        count: u32,
        log_file: Option<&Path>,
        last_problem: Option<&str>,
    ) -> Self {
        let mut lines = vec![format!("There has been {} errors in the script {}", count, name)];
        if let Some(problem) = last_problem {
            lines.push(format!("Last problem: {}", problem));
        }
        lines.push(match log_file {
            Some(path) => format!(
                "Please check the log file {} for more details",
                path.display()
            ),
            None => "Please check the logs for more details".to_string(),
        });

        Self {
            subject: format!("Too many errors in {}", name),
            body: lines.join("\n"),
        }
    }
}

/// Delivers alerts to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `alert`.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log. Used when no SMTP relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::error!(subject = %alert.subject, body = %alert.body, "Operator alert");
        Ok(())
    }
}
