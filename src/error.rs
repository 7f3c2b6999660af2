//! Error types for courier.

use thiserror::Error;

/// Errors that can occur while validating, queueing, or delivering emails.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Configuration error (missing env var, invalid value, no usable provider).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `queue_email` was called before a queue was wired into the manager.
    #[error("Email queue not initialized")]
    QueueNotInitialized,

    /// No provider is registered under this name.
    #[error("Unknown email provider: {0}")]
    UnknownProvider(String),

    /// The provider is already the default.
    #[error("Provider '{0}' is already the default provider")]
    AlreadyDefault(String),

    /// Missing required field (recipients, subject, body).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Attachment is malformed (no filename, no content, unreadable file).
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Attachment content type is not in the allow-list.
    #[error("Attachment {filename} has an unsupported content type: {content_type}")]
    UnsupportedContentType {
        filename: String,
        content_type: String,
    },

    /// Error building the MIME message.
    #[error("Build error: {0}")]
    BuildError(String),

    /// One connection method of the fallback chain failed.
    #[error("{method} delivery failed: {message}")]
    Transport {
        method: &'static str,
        message: String,
    },

    /// Every connection method failed for one delivery attempt.
    #[error("All SMTP connection methods failed, last error: {0}")]
    DeliveryExhausted(Box<MailError>),

    /// A task used up its retries.
    #[error("Task {task_id} failed after {attempts} attempt(s)")]
    RetriesExhausted { task_id: String, attempts: u32 },

    /// Provider-specific error with details.
    #[error("Provider error ({provider}): {message}")]
    ProviderError { provider: String, message: String },
}

impl MailError {
    /// Create a provider-specific error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a transport error for one fallback method.
    pub fn transport(method: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            method,
            message: message.into(),
        }
    }

    /// Whether this error was raised by message validation.
    ///
    /// Validation errors are never retried: resending the same message
    /// cannot make it valid.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::InvalidAddress(_)
                | Self::InvalidAttachment(_)
                | Self::UnsupportedContentType { .. }
        )
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::BuildError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(MailError::MissingField("to").is_validation());
        assert!(MailError::InvalidAddress("nope".into()).is_validation());
        assert!(MailError::UnsupportedContentType {
            filename: "a.exe".into(),
            content_type: "application/x-msdownload".into(),
        }
        .is_validation());

        assert!(!MailError::transport("TLS", "handshake failed").is_validation());
        assert!(!MailError::QueueNotInitialized.is_validation());
        assert!(!MailError::BuildError("bad header".into()).is_validation());
    }

    #[test]
    fn test_exhausted_names_last_failure() {
        let err = MailError::DeliveryExhausted(Box::new(MailError::transport(
            "Plaintext",
            "connection refused",
        )));
        assert_eq!(
            err.to_string(),
            "All SMTP connection methods failed, last error: Plaintext delivery failed: connection refused"
        );
    }
}
