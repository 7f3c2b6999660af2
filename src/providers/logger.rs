//! Provider that writes emails to the log instead of sending them.
//!
//! Handy in staging, or while the SMTP relay is not set up yet.

use async_trait::async_trait;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

/// Emits a tracing event per email and reports success.
#[derive(Debug, Default)]
pub struct LoggerMailer {
    /// Log every field and the bodies, not just a summary.
    log_full: bool,
}

impl LoggerMailer {
    /// Logger with brief output (recipients and subject).
    pub fn new() -> Self {
        Self { log_full: false }
    }

    /// Logger with full email details.
    pub fn full() -> Self {
        Self { log_full: true }
    }
}

#[async_trait]
impl Mailer for LoggerMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        email.validate()?;
        let message_id = uuid::Uuid::new_v4().to_string();

        if self.log_full {
            tracing::info!(
                message_id = %message_id,
                from = ?email.from.as_ref().map(|a| a.formatted()),
                to = ?email.to.iter().map(|a| a.formatted()).collect::<Vec<_>>(),
                cc = ?email.cc.iter().map(|a| a.formatted()).collect::<Vec<_>>(),
                bcc = email.bcc.len(),
                subject = %email.subject,
                attachments = email.attachments.len(),
                metadata = ?email.metadata,
                "Email logged (full)"
            );
            if let Some(text) = &email.text_body {
                tracing::debug!(body = %text, "Text body");
            }
            if let Some(html) = &email.html_body {
                tracing::debug!(body = %html, "HTML body");
            }
        } else {
            tracing::info!(
                message_id = %message_id,
                to = %email.recipients_summary(),
                subject = %email.subject,
                "Email logged"
            );
        }

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}
