//! Logger provider tests.

use courier::providers::LoggerMailer;
use courier::{Attachment, Email, MailError, Mailer};

#[tokio::test]
async fn deliver_returns_message_id() {
    let mailer = LoggerMailer::new();
    let email = Email::new()
        .to("alice@example.com")
        .subject("Hello")
        .text_body("Hello!");

    let delivery = mailer.deliver(&email).await.unwrap();
    assert!(!delivery.message_id.is_empty());
}

#[tokio::test]
async fn full_logging_accepts_all_fields() {
    let mailer = LoggerMailer::full();
    let email = Email::new()
        .from(("Budget Bot", "budget@example.com"))
        .to("alice@example.com")
        .to(("Bob", "bob@example.com"))
        .cc("carol@example.com")
        .bcc("audit@example.com")
        .reply_to("support@example.com")
        .subject("Statement")
        .html_body("<h1>March</h1>")
        .text_body("March")
        .attachment(Attachment::from_bytes("march.pdf", b"%PDF".to_vec()))
        .metadata("user_id", "42");

    assert!(mailer.deliver(&email).await.is_ok());
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let mailer = LoggerMailer::new();
    let result = mailer.deliver(&Email::new().subject("no recipients")).await;
    assert!(matches!(result, Err(MailError::MissingField("to"))));
}

#[tokio::test]
async fn health_check_always_passes() {
    assert!(LoggerMailer::new().health_check().await.is_ok());
}

#[test]
fn provider_name_returns_logger() {
    assert_eq!(LoggerMailer::new().provider_name(), "logger");
}
