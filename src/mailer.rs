//! Delivery provider trait and delivery result type.
//!
//! Providers are used as `Arc<dyn Mailer>` by the manager and the workers, so
//! the trait goes through `#[async_trait]`: native async trait methods are
//! not object safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::MailError;

/// Result of a successful email delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Identifier of the delivered message (the Message-ID for SMTP)
    pub message_id: String,
    /// Optional provider-specific response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<serde_json::Value>,
}

impl DeliveryResult {
    /// Create a new delivery result with just a message ID.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            provider_response: None,
        }
    }

    /// Create a delivery result with provider response.
    pub fn with_response(message_id: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            message_id: message_id.into(),
            provider_response: Some(response),
        }
    }
}

/// A delivery provider.
///
/// # Example
///
/// ```
/// use courier::{Email, Mailer};
/// use courier::providers::LocalMailer;
///
/// # async fn run() -> Result<(), courier::MailError> {
/// let mailer = LocalMailer::new();
/// let email = Email::new()
///     .to("alice@example.com")
///     .subject("Hello")
///     .text_body("World");
///
/// let result = mailer.deliver(&email).await?;
/// assert!(!result.message_id.is_empty());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email and return its delivery ID.
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError>;

    /// Send several emails.
    ///
    /// Each message succeeds or fails on its own: the returned vector has one
    /// result per input, in order. A failure never stops the rest of the
    /// batch.
    async fn deliver_many(&self, emails: &[Email]) -> Vec<Result<DeliveryResult, MailError>> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            results.push(self.deliver(email).await);
        }
        results
    }

    /// Lightweight reachability probe. Does not send anything.
    async fn health_check(&self) -> Result<(), MailError> {
        Ok(())
    }

    /// Provider name, for logs and metrics.
    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}
