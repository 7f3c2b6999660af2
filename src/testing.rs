//! Assertion helpers for tests that send mail through a [`LocalMailer`].
//!
//! ```rust,ignore
//! use courier::providers::LocalMailer;
//! use courier::testing::*;
//!
//! #[tokio::test]
//! async fn test_overspend_alert() {
//!     let mailer = LocalMailer::new();
//!
//!     // ... run the code under test ...
//!
//!     assert_email_to(&mailer, "user@example.com");
//!     assert_email_subject_contains(&mailer, "over budget");
//!     assert_no_admin_alerts(&mailer);
//! }
//! ```
//!
//! Every helper panics with a summary of what was actually sent.

use regex::Regex;

use crate::providers::{LocalMailer, SentEmail};
use crate::queue::TaskQueue;
use crate::task::ADMIN_ALERT_TYPE;

fn format_email_summary(emails: &[SentEmail]) -> String {
    if emails.is_empty() {
        return "  (no emails sent)".to_string();
    }

    emails
        .iter()
        .enumerate()
        .map(|(i, sent)| {
            let e = &sent.email;
            format!(
                "  {}. Recipients: [{}], Subject: \"{}\"",
                i + 1,
                e.recipients_summary(),
                e.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assert that at least one email was sent.
pub fn assert_email_sent(mailer: &LocalMailer) {
    assert!(
        mailer.has_emails(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    let emails = mailer.emails();
    assert!(
        emails.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert that exactly `expected` emails were sent.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let emails = mailer.emails();
    assert!(
        emails.len() == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert that `deliver` was called exactly `expected` times.
pub fn assert_delivery_attempts(mailer: &LocalMailer, expected: u32) {
    let actual = mailer.attempts();
    assert!(
        actual == expected,
        "Expected {} delivery attempt(s), but saw {}.\n\nEmails sent:\n{}",
        expected,
        actual,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that an email went to `address` (to, cc or bcc).
pub fn assert_email_to(mailer: &LocalMailer, address: &str) {
    assert!(
        mailer.sent_to(address),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        address,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that no email went to `address`.
pub fn refute_email_to(mailer: &LocalMailer, address: &str) {
    assert!(
        !mailer.sent_to(address),
        "Expected no email to be sent to '{}'.\n\nEmails sent:\n{}",
        address,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that an email with a subject containing `text` was sent.
pub fn assert_email_subject_contains(mailer: &LocalMailer, text: &str) {
    assert!(
        mailer.sent_with_subject_containing(text),
        "Expected an email with subject containing '{}'.\n\nEmails sent:\n{}",
        text,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that some HTML body matches `pattern`.
///
/// # Panics
///
/// Panics if the pattern is invalid or nothing matches.
pub fn assert_email_html_matches(mailer: &LocalMailer, pattern: &str) {
    let re = Regex::new(pattern).expect("Invalid regex pattern");
    let emails = mailer.emails();
    let found = emails
        .iter()
        .any(|sent| sent.email.html_body.as_deref().is_some_and(|h| re.is_match(h)));

    assert!(
        found,
        "Expected an HTML body matching /{}/.\n\nEmails sent:\n{}",
        pattern,
        format_email_summary(&emails)
    );
}

/// Administrative failure alerts delivered so far.
pub fn admin_alerts(mailer: &LocalMailer) -> Vec<SentEmail> {
    mailer.find_emails(|e| e.metadata_value("type") == Some(ADMIN_ALERT_TYPE))
}

/// Assert that exactly `expected` admin alerts were delivered.
pub fn assert_admin_alert_count(mailer: &LocalMailer, expected: usize) {
    let alerts = admin_alerts(mailer);
    assert!(
        alerts.len() == expected,
        "Expected {} admin alert(s), but {} were sent.\n\nEmails sent:\n{}",
        expected,
        alerts.len(),
        format_email_summary(&mailer.emails())
    );
}

/// Assert that no admin alert was delivered.
pub fn assert_no_admin_alerts(mailer: &LocalMailer) {
    assert_admin_alert_count(mailer, 0);
}

/// Assert the number of pending tasks.
pub fn assert_queue_len(queue: &TaskQueue, expected: usize) {
    let actual = queue.len();
    assert!(
        actual == expected,
        "Expected {} queued task(s), but found {}",
        expected,
        actual
    );
}
