//! SMTP provider tests.
//!
//! A scripted connector stands in for the relay, so these tests exercise the
//! fallback chain without opening sockets.

use async_trait::async_trait;
use courier::providers::{ConnectionMethod, SmtpConnector, SmtpMailer};
use courier::{Attachment, Email, MailError, Mailer};
use lettre::address::Envelope;
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// Scripted Connector
// ============================================================================

#[derive(Default)]
struct ScriptedConnector {
    /// Methods that accept the message.
    accepting: Vec<ConnectionMethod>,
    probe_error: Option<String>,
    calls: Mutex<Vec<ConnectionMethod>>,
    recipients: Mutex<Vec<Vec<String>>>,
    messages: Mutex<Vec<String>>,
    probes: Mutex<u32>,
}

impl ScriptedConnector {
    fn accepting(methods: &[ConnectionMethod]) -> Arc<Self> {
        Arc::new(Self {
            accepting: methods.to_vec(),
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<ConnectionMethod> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SmtpConnector for ScriptedConnector {
    async fn send(
        &self,
        method: ConnectionMethod,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<String, MailError> {
        self.calls.lock().push(method);
        if !self.accepting.contains(&method) {
            return Err(MailError::transport(method.as_str(), "connection refused"));
        }
        self.recipients
            .lock()
            .push(envelope.to().iter().map(|a| a.to_string()).collect());
        self.messages
            .lock()
            .push(String::from_utf8_lossy(message).into_owned());
        Ok("250 2.0.0 OK queued".to_string())
    }

    async fn probe(&self) -> Result<(), MailError> {
        *self.probes.lock() += 1;
        match &self.probe_error {
            Some(message) => Err(MailError::transport("TLS", message.clone())),
            None => Ok(()),
        }
    }
}

fn mailer(connector: Arc<ScriptedConnector>) -> SmtpMailer {
    SmtpMailer::new("smtp.example.com", 587)
        .from(("Budget App", "noreply@budget.example"))
        .connector(connector)
        .build()
}

/// Value of the first top-level header called `name`.
fn header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{name}: ");
    raw.split("\r\n")
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix(prefix.as_str()))
}

fn email() -> Email {
    Email::new()
        .to("alice@example.com")
        .cc("bob@example.com")
        .bcc("audit@example.com")
        .subject("Monthly statement")
        .text_body("Your statement is attached.")
}

// ============================================================================
// Fallback Chain Tests
// ============================================================================

#[tokio::test]
async fn implicit_tls_success_stops_the_chain() {
    let connector = ScriptedConnector::accepting(&[
        ConnectionMethod::ImplicitTls,
        ConnectionMethod::StartTls,
        ConnectionMethod::Plaintext,
    ]);
    let result = mailer(connector.clone()).deliver(&email()).await.unwrap();

    assert_eq!(connector.calls(), vec![ConnectionMethod::ImplicitTls]);
    let response = result.provider_response.unwrap();
    assert_eq!(response["method"], "TLS");
    assert_eq!(response["reply"], "250 2.0.0 OK queued");
}

#[tokio::test]
async fn falls_back_to_starttls() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::StartTls]);
    let result = mailer(connector.clone()).deliver(&email()).await.unwrap();

    assert_eq!(
        connector.calls(),
        vec![ConnectionMethod::ImplicitTls, ConnectionMethod::StartTls]
    );
    assert_eq!(result.provider_response.unwrap()["method"], "STARTTLS");
}

#[tokio::test]
async fn plaintext_is_the_last_resort() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::Plaintext]);
    mailer(connector.clone()).deliver(&email()).await.unwrap();

    assert_eq!(connector.calls(), ConnectionMethod::FALLBACK_ORDER.to_vec());
}

#[tokio::test]
async fn all_methods_failing_is_exhausted() {
    let connector = ScriptedConnector::accepting(&[]);
    let err = mailer(connector.clone()).deliver(&email()).await.unwrap_err();

    assert_eq!(connector.calls().len(), 3);
    match err {
        MailError::DeliveryExhausted(last) => {
            assert!(matches!(*last, MailError::Transport { method: "Plaintext", .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn every_attempt_restarts_the_chain() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::StartTls]);
    let mailer = mailer(connector.clone());
    mailer.deliver(&email()).await.unwrap();
    mailer.deliver(&email()).await.unwrap();

    assert_eq!(
        connector.calls(),
        vec![
            ConnectionMethod::ImplicitTls,
            ConnectionMethod::StartTls,
            ConnectionMethod::ImplicitTls,
            ConnectionMethod::StartTls,
        ]
    );
}

// ============================================================================
// Message Tests
// ============================================================================

#[tokio::test]
async fn envelope_includes_every_recipient() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    mailer(connector.clone()).deliver(&email()).await.unwrap();

    assert_eq!(
        connector.recipients.lock()[0],
        vec!["alice@example.com", "bob@example.com", "audit@example.com"]
    );
}

#[tokio::test]
async fn rendered_message_hides_bcc() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    let result = mailer(connector.clone())
        .deliver(&email().attachment(Attachment::from_bytes("statement.pdf", b"%PDF".to_vec())))
        .await
        .unwrap();

    let message = connector.messages.lock()[0].clone();
    let from = header(&message, "From").unwrap();
    assert!(from.contains("Budget App") && from.contains("<noreply@budget.example>"));
    assert!(header(&message, "To").unwrap().contains("alice@example.com"));
    assert!(header(&message, "Cc").unwrap().contains("bob@example.com"));
    assert!(!message.contains("audit@example.com"));
    assert!(message.contains("multipart/mixed"));
    assert!(message.contains("statement.pdf"));
    assert_eq!(header(&message, "Message-ID"), Some(result.message_id.as_str()));
}

#[tokio::test]
async fn message_sender_overrides_configured_sender() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    mailer(connector.clone())
        .deliver(&email().from("owner@budget.example"))
        .await
        .unwrap();

    let message = connector.messages.lock()[0].clone();
    assert_eq!(header(&message, "From"), Some("owner@budget.example"));
}

#[tokio::test]
async fn missing_sender_is_rejected() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    let mailer = SmtpMailer::new("smtp.example.com", 587)
        .connector(connector.clone())
        .build();

    let result = mailer.deliver(&email()).await;
    assert!(matches!(result, Err(MailError::MissingField("from"))));
    assert!(connector.calls().is_empty());
}

// ============================================================================
// Validation Tests
// ============================================================================

#[tokio::test]
async fn invalid_message_never_reaches_the_relay() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    let mailer = mailer(connector.clone());

    let no_body = Email::new().to("alice@example.com").subject("Empty");
    assert!(matches!(
        mailer.deliver(&no_body).await,
        Err(MailError::MissingField("body"))
    ));

    let bad_attachment = email().attachment(Attachment::from_bytes("tool.exe", vec![1]));
    assert!(matches!(
        mailer.deliver(&bad_attachment).await,
        Err(MailError::UnsupportedContentType { .. })
    ));

    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn batch_reports_each_message() {
    let connector = ScriptedConnector::accepting(&[ConnectionMethod::ImplicitTls]);
    let mailer = mailer(connector.clone());
    let batch = [
        email(),
        Email::new().to("not-an-address").subject("s").text_body("b"),
        email(),
    ];

    let results = mailer.deliver_many(&batch).await;
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(MailError::InvalidAddress(_))));
    assert!(results[2].is_ok());
    assert_eq!(connector.calls().len(), 2);
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn health_check_probes_connector() {
    let connector = ScriptedConnector::accepting(&[]);
    let mailer = mailer(connector.clone());

    assert!(mailer.health_check().await.is_ok());
    assert_eq!(*connector.probes.lock(), 1);
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn health_check_reports_probe_failure() {
    let connector = Arc::new(ScriptedConnector {
        probe_error: Some("handshake failed".into()),
        ..ScriptedConnector::default()
    });
    let err = mailer(connector).health_check().await.unwrap_err();
    assert!(err.to_string().contains("handshake failed"));
}

#[test]
fn provider_name_returns_smtp() {
    let mailer = mailer(ScriptedConnector::accepting(&[]));
    assert_eq!(mailer.provider_name(), "smtp");
}
