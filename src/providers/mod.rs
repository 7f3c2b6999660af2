//! Delivery provider implementations.
//!
//! Each provider implements the [`Mailer`](crate::Mailer) trait.
//!
//! | Provider | Feature Flag | Description |
//! |----------|-------------|-------------|
//! | [`SmtpMailer`] | `smtp` | SMTP via lettre, TLS / STARTTLS / plaintext fallback |
//! | [`LoggerMailer`] | (none) | Logs emails without sending |
//! | [`LocalMailer`] | (none) | In-memory mailbox for dev/testing |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{ConnectionMethod, LettreConnector, SmtpBuilder, SmtpConnector, SmtpMailer};

mod local;
pub use local::{LocalMailer, SentEmail};

mod logger;
pub use logger::LoggerMailer;
