//! Local provider tests.

use courier::providers::LocalMailer;
use courier::{Email, MailError, Mailer};

fn email(to: &str, subject: &str) -> Email {
    Email::new()
        .from("budget@example.com")
        .to(to)
        .subject(subject)
        .text_body("Hello!")
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn deliver_returns_message_id() {
    let mailer = LocalMailer::new();
    let result = mailer.deliver(&email("alice@example.com", "Hi")).await.unwrap();

    assert!(!result.message_id.is_empty());
    assert!(result.provider_response.is_none());
    assert_eq!(mailer.last_email().unwrap().id, result.message_id);
}

#[tokio::test]
async fn deliver_many_reports_each_message() {
    let mailer = LocalMailer::new();
    let batch = [
        email("alice@example.com", "one"),
        Email::new().to("bob@example.com").text_body("no subject"),
        email("carol@example.com", "three"),
    ];

    let results = mailer.deliver_many(&batch).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(MailError::MissingField("subject"))));
    assert!(results[2].is_ok());
    assert_eq!(mailer.email_count(), 2);
}

// ============================================================================
// Storage Tests
// ============================================================================

#[tokio::test]
async fn emails_are_kept_in_send_order() {
    let mailer = LocalMailer::new();
    mailer.deliver(&email("a@example.com", "first")).await.unwrap();
    mailer.deliver(&email("b@example.com", "second")).await.unwrap();

    let subjects: Vec<String> = mailer.emails().into_iter().map(|s| s.email.subject).collect();
    assert_eq!(subjects, vec!["first", "second"]);
}

#[tokio::test]
async fn find_emails_filters() {
    let mailer = LocalMailer::new();
    mailer.deliver(&email("a@example.com", "Invoice 1")).await.unwrap();
    mailer.deliver(&email("b@example.com", "Reminder")).await.unwrap();
    mailer.deliver(&email("c@example.com", "Invoice 2")).await.unwrap();

    let invoices = mailer.find_emails(|e| e.subject.starts_with("Invoice"));
    assert_eq!(invoices.len(), 2);
}

#[tokio::test]
async fn flush_and_clear() {
    let mailer = LocalMailer::new();
    mailer.deliver(&email("a@example.com", "1")).await.unwrap();
    mailer.deliver(&email("a@example.com", "2")).await.unwrap();

    assert_eq!(mailer.flush().len(), 2);
    assert_eq!(mailer.email_count(), 0);

    mailer.deliver(&email("a@example.com", "3")).await.unwrap();
    mailer.clear();
    assert!(!mailer.has_emails());
    assert_eq!(mailer.attempts(), 0);
}

#[tokio::test]
async fn clones_share_storage() {
    let mailer = LocalMailer::new();
    let handle = mailer.clone();
    handle.deliver(&email("a@example.com", "shared")).await.unwrap();
    assert!(mailer.sent_with_subject("shared"));
}

// ============================================================================
// Failure Simulation Tests
// ============================================================================

#[tokio::test]
async fn can_simulate_failure() {
    let mailer = LocalMailer::new();
    mailer.set_failure("SMTP connection refused");

    let err = mailer.deliver(&email("a@example.com", "x")).await.unwrap_err();
    assert!(err.to_string().contains("SMTP connection refused"));
    assert!(!err.is_validation());

    mailer.clear_failure();
    assert!(mailer.deliver(&email("a@example.com", "x")).await.is_ok());
}

#[tokio::test]
async fn health_failure_is_reported() {
    let mailer = LocalMailer::new();
    assert!(mailer.health_check().await.is_ok());

    mailer.set_health_failure("login rejected");
    assert!(mailer.health_check().await.is_err());

    mailer.clear_failure();
    assert!(mailer.health_check().await.is_ok());
}

#[test]
fn provider_name_returns_local() {
    assert_eq!(LocalMailer::new().provider_name(), "local");
}
