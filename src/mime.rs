//! MIME rendering for SMTP delivery.
//!
//! Builds the RFC 5322 message handed to the SMTP transport with lettre's
//! message builder:
//!
//! ```text
//! multipart/mixed                  (only when there are attachments)
//! ├── multipart/alternative        (only when there is an HTML body)
//! │   ├── text/plain               (text body, or derived from the HTML)
//! │   └── text/html
//! └── attachment parts (base64)
//! ```

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use crate::email::Email;

#[cfg(feature = "smtp")]
use lettre::{
    address::Envelope,
    message::{
        header::{ContentTransferEncoding, ContentType, HeaderName, HeaderValue},
        Attachment as LettreAttachment, Body, Mailbox, Message, MultiPart, SinglePart,
    },
};

#[cfg(feature = "smtp")]
use crate::{address::Address, attachment::Attachment, error::MailError};

/// Value of the `X-Mailer` header.
pub const X_MAILER: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Headers the renderer owns. Custom headers with these names are ignored.
#[cfg(feature = "smtp")]
const RESERVED_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "subject",
    "date",
    "message-id",
    "mime-version",
    "content-type",
    "content-transfer-encoding",
    "return-path",
    "reply-to",
    "x-mailer",
    "list-unsubscribe",
];

/// A rendered message ready for the wire.
#[cfg(feature = "smtp")]
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// The generated Message-ID, including angle brackets
    pub message_id: String,
    /// Full message: headers, blank line, body. CRLF line endings.
    pub bytes: Vec<u8>,
}

/// Render `email` as sent by `from`.
///
/// `hostname` is used for the Message-ID domain. Bcc recipients are not
/// written to the headers; they only travel in `envelope`.
#[cfg(feature = "smtp")]
pub fn render(
    email: &Email,
    from: &Address,
    hostname: &str,
    envelope: &Envelope,
) -> Result<RenderedMessage, MailError> {
    let message_id = generate_message_id(hostname);
    let sender = mailbox(from)?;

    let mut builder = Message::builder()
        .from(sender.clone())
        .subject(sanitize_header_value(&email.subject))
        .date_now()
        .message_id(Some(message_id.clone()))
        .envelope(envelope.clone());
    for addr in &email.to {
        builder = builder.to(mailbox(addr)?);
    }
    for addr in &email.cc {
        builder = builder.cc(mailbox(addr)?);
    }
    if email.reply_to.is_empty() {
        builder = builder.reply_to(sender);
    } else {
        for addr in &email.reply_to {
            builder = builder.reply_to(mailbox(addr)?);
        }
    }

    let text = plain_text_body(email);
    let html = email.html_body.as_ref().filter(|html| !html.trim().is_empty());

    let mut message = if email.attachments.is_empty() {
        match html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(text, html.clone()))?,
            None => builder.singlepart(SinglePart::plain(text))?,
        }
    } else {
        let mut mixed = match html {
            Some(html) => MultiPart::mixed()
                .multipart(MultiPart::alternative_plain_html(text, html.clone())),
            None => MultiPart::mixed().singlepart(SinglePart::plain(text)),
        };
        for attachment in &email.attachments {
            mixed = mixed.singlepart(attachment_part(attachment)?);
        }
        builder.multipart(mixed)?
    };

    let from_ascii = from.to_ascii()?;
    let headers = message.headers_mut();
    headers.insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("X-Mailer"),
        X_MAILER.to_string(),
    ));
    headers.insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("Return-Path"),
        format!("<{from_ascii}>"),
    ));
    headers.insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("List-Unsubscribe"),
        format!("<mailto:{from_ascii}?subject=unsubscribe>"),
    ));

    let mut custom: Vec<_> = email.headers.iter().collect();
    custom.sort();
    for (name, value) in custom {
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match HeaderName::new_from_ascii(name.clone()) {
            Ok(header) => headers.insert_raw(HeaderValue::new(header, sanitize_header_value(value))),
            Err(_) => tracing::warn!(header = %name, "Skipping custom header with invalid name"),
        }
    }

    Ok(RenderedMessage {
        message_id,
        bytes: message.formatted(),
    })
}

#[cfg(feature = "smtp")]
fn mailbox(addr: &Address) -> Result<Mailbox, MailError> {
    let name = addr
        .name
        .as_deref()
        .map(sanitize_header_value)
        .filter(|name| !name.trim().is_empty());
    Ok(Mailbox::new(name, addr.to_ascii()?.parse()?))
}

/// Attachment bodies are always base64, whatever their content.
#[cfg(feature = "smtp")]
fn attachment_part(attachment: &Attachment) -> Result<SinglePart, MailError> {
    let content_type = ContentType::parse(&attachment.content_type).map_err(|_| {
        MailError::UnsupportedContentType {
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
        }
    })?;
    let body = Body::new_with_encoding(attachment.data.clone(), ContentTransferEncoding::Base64)
        .unwrap_or_else(Body::new);
    Ok(LettreAttachment::new(attachment.filename.clone()).body(body, content_type))
}

#[cfg(feature = "smtp")]
fn sanitize_header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// `<uuid.unix-seconds.nanos@hostname>`
pub fn generate_message_id(hostname: &str) -> String {
    let now = Utc::now();
    let host = if hostname.trim().is_empty() {
        "localhost"
    } else {
        hostname.trim()
    };
    format!(
        "<{}.{}.{}@{}>",
        uuid::Uuid::new_v4().simple(),
        now.timestamp(),
        now.timestamp_subsec_nanos(),
        host
    )
}

/// The plain-text alternative: the text body if present, else the HTML body
/// with markup stripped.
pub fn plain_text_body(email: &Email) -> String {
    match (&email.text_body, &email.html_body) {
        (Some(text), _) if !text.trim().is_empty() => text.clone(),
        (_, Some(html)) => html_to_text(html),
        _ => String::new(),
    }
}

struct TextPatterns {
    invisible: Regex,
    line_break: Regex,
    block_end: Regex,
    list_item: Regex,
    tag: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static TextPatterns {
    static PATTERNS: OnceLock<TextPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TextPatterns {
        invisible: Regex::new(r"(?is)<(script|style|head)[^>]*>.*?</(script|style|head)\s*>")
            .expect("static regex"),
        line_break: Regex::new(r"(?i)<br\s*/?>").expect("static regex"),
        block_end: Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|table|ul|ol)\s*>").expect("static regex"),
        list_item: Regex::new(r"(?i)<li(\s[^>]*)?>").expect("static regex"),
        tag: Regex::new(r"<[^>]*>").expect("static regex"),
        blank_lines: Regex::new(r"\n{3,}").expect("static regex"),
    })
}

/// Derive readable plain text from an HTML body.
///
/// ```
/// use courier::mime::html_to_text;
///
/// let text = html_to_text("<p>Hello</p><ul><li>rent</li><li>food</li></ul>");
/// assert_eq!(text, "Hello\n- rent\n- food");
/// ```
pub fn html_to_text(html: &str) -> String {
    let p = patterns();
    let text = html.replace("\r\n", "\n");
    let text = p.invisible.replace_all(&text, "");
    let text = p.line_break.replace_all(&text, "\n");
    let text = p.block_end.replace_all(&text, "\n");
    let text = p.list_item.replace_all(&text, "- ");
    let text = p.tag.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let text = lines.join("\n");
    let text = p.blank_lines.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
