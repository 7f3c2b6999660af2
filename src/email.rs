//! Email message with builder pattern and pre-send validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::address::{Address, ToAddress};
use crate::attachment::Attachment;
use crate::error::MailError;

/// An email message.
///
/// Use the builder pattern to construct emails:
///
/// ```
/// use courier::Email;
///
/// let email = Email::new()
///     .from("budget@example.com")
///     .to("alice@example.com")
///     .subject("Your monthly summary")
///     .html_body("<h1>March</h1><p>You stayed under budget.</p>")
///     .metadata("type", "monthly_summary");
///
/// assert!(email.validate().is_ok());
/// ```
///
/// A message without `from` is sent with the provider's configured sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Carbon copy recipients
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients (envelope only, never in headers)
    pub bcc: Vec<Address>,
    /// Reply-to addresses
    pub reply_to: Vec<Address>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// File attachments
    pub attachments: Vec<Attachment>,
    /// Custom email headers
    pub headers: HashMap<String, String>,
    /// Free-form annotations (never rendered into the message)
    pub metadata: HashMap<String, String>,
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    /// Add a recipient. Can be called multiple times.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to.push(addr.to_address());
        self
    }

    /// Replace all recipients.
    pub fn put_to(mut self, addrs: Vec<Address>) -> Self {
        self.to = addrs;
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.push(addr.to_address());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.push(addr.to_address());
        self
    }

    /// Add a reply-to address.
    pub fn reply_to(mut self, addr: impl ToAddress) -> Self {
        self.reply_to.push(addr.to_address());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Add an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check that the message can be delivered.
    ///
    /// Requires at least one recipient (to, cc or bcc), well-formed recipient
    /// addresses, a non-blank subject, a non-blank body (HTML or text) and
    /// attachments that pass [`Attachment::validate`].
    pub fn validate(&self) -> Result<(), MailError> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(MailError::MissingField("to"));
        }

        for addr in self.all_recipients() {
            if !addr.is_valid() {
                return Err(MailError::InvalidAddress(format!(
                    "'{}' is not a valid recipient",
                    addr.email
                )));
            }
        }

        if self.subject.trim().is_empty() {
            return Err(MailError::MissingField("subject"));
        }

        if !self.has_body() {
            return Err(MailError::MissingField("body"));
        }

        for attachment in &self.attachments {
            attachment.validate()?;
        }

        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Whether the HTML or text body has non-whitespace content.
    pub fn has_body(&self) -> bool {
        let filled = |body: &Option<String>| body.as_deref().is_some_and(|b| !b.trim().is_empty());
        filled(&self.html_body) || filled(&self.text_body)
    }

    /// All envelope recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> Vec<&Address> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .collect()
    }

    /// Check if the email has any attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Look up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Comma-separated list of every recipient (to, cc, bcc), for logs.
    pub fn recipients_summary(&self) -> String {
        self.all_recipients()
            .iter()
            .map(|a| a.email.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
