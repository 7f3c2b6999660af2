//! Email attachments and the content-type allow-list.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MailError;

/// Content types accepted for attachments.
///
/// Anything else is rejected at validation time, before the message is
/// queued or handed to a provider.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "text/plain",
];

/// A file attached to an email.
///
/// ```
/// use courier::Attachment;
///
/// let receipt = Attachment::from_bytes("receipt.pdf", b"%PDF-1.7".to_vec());
/// assert_eq!(receipt.content_type, "application/pdf");
/// assert!(receipt.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename presented to the recipient
    pub filename: String,
    /// Declared MIME content type
    pub content_type: String,
    /// Raw content
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment from raw bytes.
    ///
    /// The content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Read an attachment from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let data = std::fs::read(path)
            .map_err(|e| MailError::InvalidAttachment(format!("{}: {}", path.display(), e)))?;

        Ok(Self::from_bytes(filename, data))
    }

    /// Override the guessed content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Check filename, content and content type against the allow-list.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.filename.trim().is_empty() {
            return Err(MailError::InvalidAttachment(
                "attachment filename is missing".into(),
            ));
        }
        if self.data.is_empty() {
            return Err(MailError::InvalidAttachment(format!(
                "attachment content is empty: {}",
                self.filename
            )));
        }
        if !is_allowed_content_type(&self.content_type) {
            return Err(MailError::UnsupportedContentType {
                filename: self.filename.clone(),
                content_type: self.content_type.clone(),
            });
        }
        Ok(())
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Whether `content_type` is in [`ALLOWED_CONTENT_TYPES`].
///
/// Parameters (`; charset=...`) and case are ignored.
pub fn is_allowed_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
}
