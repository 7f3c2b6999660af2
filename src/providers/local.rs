//! In-memory provider for development and tests.
//!
//! Records delivered emails, counts delivery attempts and can be told to fail,
//! which makes it the stub of choice for exercising retries and alerts.
//!
//! ```rust,ignore
//! use courier::providers::LocalMailer;
//! use courier::testing::*;
//!
//! #[tokio::test]
//! async fn test_sends_reset_email() {
//!     let mailer = LocalMailer::new();
//!
//!     // Code under test
//!     send_password_reset(&mailer, "user@example.com").await;
//!
//!     assert_email_to(&mailer, "user@example.com");
//!     assert_email_subject_contains(&mailer, "Reset");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

/// An email accepted by a [`LocalMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Delivery ID returned to the caller
    pub id: String,
    pub email: Email,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    sent: Vec<SentEmail>,
    attempts: u32,
    /// Fail every delivery with this message.
    fail_with: Option<String>,
    /// Fail this many upcoming deliveries, then recover.
    transient_failures: u32,
    health_failure: Option<String>,
}

/// Provider that keeps emails in memory.
///
/// Clones share the same mailbox.
#[derive(Debug, Clone, Default)]
pub struct LocalMailer {
    state: Arc<Mutex<State>>,
}

impl LocalMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery until [`clear_failure`](Self::clear_failure).
    pub fn set_failure(&self, message: impl Into<String>) {
        self.state.lock().fail_with = Some(message.into());
    }

    /// Fail the next `count` deliveries, then succeed again.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().transient_failures = count;
    }

    /// Make [`health_check`](Mailer::health_check) fail.
    pub fn set_health_failure(&self, message: impl Into<String>) {
        self.state.lock().health_failure = Some(message.into());
    }

    /// Clear every simulated failure.
    pub fn clear_failure(&self) {
        let mut state = self.state.lock();
        state.fail_with = None;
        state.transient_failures = 0;
        state.health_failure = None;
    }

    /// Number of `deliver` calls, successful or not.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    /// Delivered emails, oldest first.
    pub fn emails(&self) -> Vec<SentEmail> {
        self.state.lock().sent.clone()
    }

    /// The most recently delivered email.
    pub fn last_email(&self) -> Option<SentEmail> {
        self.state.lock().sent.last().cloned()
    }

    pub fn email_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn has_emails(&self) -> bool {
        !self.state.lock().sent.is_empty()
    }

    /// Forget delivered emails and reset the attempt counter.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.sent.clear();
        state.attempts = 0;
    }

    /// Remove and return all delivered emails.
    pub fn flush(&self) -> Vec<SentEmail> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Whether an email went to `address` (to, cc or bcc).
    pub fn sent_to(&self, address: &str) -> bool {
        self.state.lock().sent.iter().any(|sent| {
            sent.email
                .all_recipients()
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(address))
        })
    }

    pub fn sent_with_subject(&self, subject: &str) -> bool {
        self.state.lock().sent.iter().any(|sent| sent.email.subject == subject)
    }

    pub fn sent_with_subject_containing(&self, text: &str) -> bool {
        self.state
            .lock()
            .sent
            .iter()
            .any(|sent| sent.email.subject.contains(text))
    }

    /// Delivered emails matching a predicate.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<SentEmail>
    where
        F: Fn(&Email) -> bool,
    {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|sent| predicate(&sent.email))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        email.validate()?;

        if let Some(message) = &state.fail_with {
            return Err(MailError::provider("local", message.clone()));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(MailError::provider("local", "simulated transient failure"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        state.sent.push(SentEmail {
            id: id.clone(),
            email: email.clone(),
            sent_at: Utc::now(),
        });
        Ok(DeliveryResult::new(id))
    }

    async fn health_check(&self) -> Result<(), MailError> {
        match &self.state.lock().health_failure {
            Some(message) => Err(MailError::provider("local", message.clone())),
            None => Ok(()),
        }
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
