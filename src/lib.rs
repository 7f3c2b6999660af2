//! # Courier
//!
//! Asynchronous email dispatch: a priority queue of email tasks, a retry
//! policy with backoff, pluggable delivery providers (SMTP with TLS,
//! STARTTLS and plaintext fallback) and a pool of tokio workers draining the
//! queue.
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! SMTP_HOST=smtp.example.com
//! SMTP_USERNAME=mailer
//! SMTP_PASSWORD=secret
//! EMAIL_FROM=noreply@example.com
//! EMAIL_ADMIN_ADDRESS=ops@example.com
//! ```
//!
//! Wire the manager and the workers once at startup:
//! ```rust,ignore
//! use courier::{Dispatcher, Email, EmailConfig, EmailManager, QueueOptions};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = EmailConfig::from_env()?;
//! let manager = Arc::new(EmailManager::from_config(&config)?);
//! let pool = Dispatcher::from_manager(manager.clone())
//!     .start(config.workers, CancellationToken::new());
//!
//! let email = Email::new()
//!     .to("user@example.com")
//!     .subject("Password reset")
//!     .html_body("<p>Click the link to reset your password.</p>");
//!
//! // Returns as soon as the task is queued.
//! let task_id = manager.queue_email_with(email, QueueOptions::new().priority(1))?;
//!
//! pool.shutdown().await;
//! ```
//!
//! Delivery failures never reach the caller of `queue_email`: they are
//! retried with backoff, and once a task runs out of attempts an alert is
//! queued for the admin address.
//!
//! See [`config`] for the full list of environment variables.
//!
//! ## Feature Flags
//!
//! - `smtp` (default) - SMTP provider via lettre
//! - `metrics` - Prometheus-style metrics (counters/histograms/gauges)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `courier_emails_total` | Counter | provider, status | Delivery attempts |
//! | `courier_delivery_duration_seconds` | Histogram | provider | Delivery duration |
//! | `courier_tasks_total` | Counter | outcome | Processed queue tasks |
//! | `courier_queue_depth` | Gauge | | Pending tasks |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the courier crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod email;
mod error;
mod mailer;
mod manager;
mod queue;
mod retry;
mod task;
mod worker;

pub mod config;
pub mod mime;
pub mod providers;
pub mod testing;

pub use address::{Address, ToAddress};
pub use attachment::{is_allowed_content_type, Attachment, ALLOWED_CONTENT_TYPES};
pub use config::{EmailConfig, SmtpConfig};
pub use email::Email;
pub use error::MailError;
pub use mailer::{DeliveryResult, Mailer};
pub use manager::{EmailManager, ManagerSettings, QueueOptions};
pub use queue::TaskQueue;
pub use retry::{RetryPolicy, DEFAULT_RETRY_INTERVALS};
pub use task::{
    EmailTask, TaskStatus, ADMIN_ALERT_TYPE, DEFAULT_PRIORITY, PRIORITY_HIGHEST, PRIORITY_LOWEST,
};
pub use worker::{Dispatcher, TaskOutcome, WorkerPool};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Address;
    pub use crate::Attachment;
    pub use crate::DeliveryResult;
    pub use crate::Dispatcher;
    pub use crate::Email;
    pub use crate::EmailConfig;
    pub use crate::EmailManager;
    pub use crate::MailError;
    pub use crate::Mailer;
    pub use crate::QueueOptions;
    pub use crate::ToAddress;
}
