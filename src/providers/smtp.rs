//! SMTP provider using lettre, with connection-method fallback.
//!
//! Every delivery tries implicit TLS first, then STARTTLS, then plaintext,
//! stopping at the first method that gets the message accepted.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier::providers::SmtpMailer;
//!
//! let mailer = SmtpMailer::new("smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .from(("Budget App", "noreply@example.com"))
//!     .build();
//! ```

use async_trait::async_trait;
use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        extension::ClientId,
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::address::{Address, ToAddress};
use crate::config::SmtpConfig;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::mime;

/// Default per-connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a connection to the relay is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMethod {
    /// TLS from the first byte (SMTPS).
    ImplicitTls,
    /// Plain connection upgraded with a mandatory STARTTLS.
    StartTls,
    /// No encryption.
    Plaintext,
}

impl ConnectionMethod {
    /// The order in which methods are tried.
    pub const FALLBACK_ORDER: [ConnectionMethod; 3] =
        [Self::ImplicitTls, Self::StartTls, Self::Plaintext];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImplicitTls => "TLS",
            Self::StartTls => "STARTTLS",
            Self::Plaintext => "Plaintext",
        }
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network side of the SMTP provider.
///
/// [`LettreConnector`] talks to a real relay; tests plug in stubs.
#[async_trait]
pub trait SmtpConnector: Send + Sync {
    /// Submit an already rendered message over one connection method.
    /// Returns the server's reply.
    async fn send(
        &self,
        method: ConnectionMethod,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<String, MailError>;

    /// Open and close a connection without sending anything.
    async fn probe(&self) -> Result<(), MailError>;
}

/// [`SmtpConnector`] backed by lettre's tokio transport.
pub struct LettreConnector {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    accept_invalid_certs: bool,
    timeout: Duration,
    hello_name: Option<String>,
}

impl LettreConnector {
    fn transport(
        &self,
        method: ConnectionMethod,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let tls = match method {
            ConnectionMethod::ImplicitTls => Tls::Wrapper(self.tls_parameters(method)?),
            ConnectionMethod::StartTls => Tls::Required(self.tls_parameters(method)?),
            ConnectionMethod::Plaintext => Tls::None,
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.port)
            .tls(tls)
            .timeout(Some(self.timeout));
        if let Some(creds) = &self.credentials {
            builder = builder.credentials(creds.clone());
        }
        if let Some(name) = &self.hello_name {
            builder = builder.hello_name(ClientId::Domain(name.clone()));
        }
        Ok(builder.build())
    }

    fn tls_parameters(&self, method: ConnectionMethod) -> Result<TlsParameters, MailError> {
        TlsParameters::builder(self.host.clone())
            .dangerous_accept_invalid_certs(self.accept_invalid_certs)
            .build_rustls()
            .map_err(|e| MailError::transport(method.as_str(), e.to_string()))
    }
}

#[async_trait]
impl SmtpConnector for LettreConnector {
    async fn send(
        &self,
        method: ConnectionMethod,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<String, MailError> {
        let transport = self.transport(method)?;
        let response = transport
            .send_raw(envelope, message)
            .await
            .map_err(|e| MailError::transport(method.as_str(), e.to_string()))?;

        let text = response.message().collect::<Vec<_>>().join(" ");
        Ok(format!("{} {}", response.code(), text).trim_end().to_string())
    }

    async fn probe(&self) -> Result<(), MailError> {
        let mut last_error = None;
        for method in ConnectionMethod::FALLBACK_ORDER {
            let result = match self.transport(method) {
                Ok(transport) => transport
                    .test_connection()
                    .await
                    .map_err(|e| MailError::transport(method.as_str(), e.to_string())),
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    last_error = Some(MailError::transport(
                        method.as_str(),
                        "server did not answer NOOP",
                    ))
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(MailError::DeliveryExhausted(Box::new(last_error.unwrap_or_else(
            || MailError::transport("SMTP", "no connection method attempted"),
        ))))
    }
}

/// SMTP email provider.
pub struct SmtpMailer {
    connector: Arc<dyn SmtpConnector>,
    sender: Option<Address>,
    hostname: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer builder.
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            sender: None,
            accept_invalid_certs: false,
            timeout: DEFAULT_TIMEOUT,
            hello_name: None,
            connector: None,
        }
    }

    /// Build from configuration. Returns `None` when SMTP is disabled or has
    /// no host.
    pub fn from_config(config: &SmtpConfig, default_sender: Option<&Address>) -> Option<Self> {
        if !config.is_usable() {
            return None;
        }
        let host = config.host.as_deref()?;

        let mut builder = Self::new(host, config.port)
            .accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(user, pass);
        }
        if let Some(name) = &config.helo_name {
            builder = builder.hello_name(name);
        }
        let sender = config
            .from_email
            .as_deref()
            .map(Address::new)
            .or_else(|| default_sender.cloned());
        if let Some(sender) = sender {
            builder = builder.from(sender);
        }
        Some(builder.build())
    }

    /// The configured sender used when a message has none.
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Pick the envelope sender: the message's own `from` when it is well
    /// formed, otherwise the configured sender.
    fn resolve_sender(&self, email: &Email) -> Result<Address, MailError> {
        match &email.from {
            Some(from) if from.is_valid() => return Ok(from.clone()),
            Some(from) if !from.email.trim().is_empty() => {
                tracing::warn!(
                    from = %from.email,
                    "Invalid sender address, using configured sender"
                );
            }
            _ => {}
        }
        self.sender.clone().ok_or(MailError::MissingField("from"))
    }

    async fn send_with_fallback(
        &self,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(ConnectionMethod, String), MailError> {
        let mut last_error = None;
        for method in ConnectionMethod::FALLBACK_ORDER {
            match self.connector.send(method, envelope, message).await {
                Ok(reply) => return Ok((method, reply)),
                Err(e) => {
                    tracing::warn!(method = %method, error = %e, "SMTP connection method failed");
                    last_error = Some(e);
                }
            }
        }
        Err(MailError::DeliveryExhausted(Box::new(last_error.unwrap_or_else(
            || MailError::transport("SMTP", "no connection method attempted"),
        ))))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        // Nothing touches the network until the message is known to be valid.
        email.validate()?;

        let sender = self.resolve_sender(email)?;
        let envelope = build_envelope(&sender, email)?;
        let rendered = mime::render(email, &sender, &self.hostname, &envelope)?;

        let (method, reply) = self.send_with_fallback(&envelope, &rendered.bytes).await?;
        tracing::info!(
            method = %method,
            message_id = %rendered.message_id,
            "SMTP relay accepted message"
        );

        Ok(DeliveryResult::with_response(
            rendered.message_id,
            serde_json::json!({ "method": method.as_str(), "reply": reply }),
        ))
    }

    async fn health_check(&self) -> Result<(), MailError> {
        self.connector.probe().await
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

/// Builder for SmtpMailer.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    sender: Option<Address>,
    accept_invalid_certs: bool,
    timeout: Duration,
    hello_name: Option<String>,
    connector: Option<Arc<dyn SmtpConnector>>,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    /// Sender used for messages without a valid `from`.
    pub fn from(mut self, sender: impl ToAddress) -> Self {
        self.sender = Some(sender.to_address());
        self
    }

    /// Skip certificate verification (self-signed relays).
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Per-connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name sent in EHLO and used as the Message-ID domain.
    pub fn hello_name(mut self, name: &str) -> Self {
        self.hello_name = Some(name.to_string());
        self
    }

    /// Replace the lettre connector.
    pub fn connector(mut self, connector: Arc<dyn SmtpConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the SmtpMailer.
    pub fn build(self) -> SmtpMailer {
        let hostname = self.hello_name.clone().unwrap_or_else(|| self.host.clone());
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(LettreConnector {
                host: self.host,
                port: self.port,
                credentials: self.credentials,
                accept_invalid_certs: self.accept_invalid_certs,
                timeout: self.timeout,
                hello_name: self.hello_name,
            }),
        };

        SmtpMailer {
            connector,
            sender: self.sender,
            hostname,
        }
    }
}

/// Envelope with ASCII (punycode) domains: sender plus to, cc and bcc.
fn build_envelope(sender: &Address, email: &Email) -> Result<Envelope, MailError> {
    let from: lettre::Address = sender.to_ascii()?.parse()?;
    let recipients = email
        .all_recipients()
        .into_iter()
        .map(|addr| -> Result<lettre::Address, MailError> { Ok(addr.to_ascii()?.parse()?) })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Envelope::new(Some(from), recipients)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_order() {
        assert_eq!(
            ConnectionMethod::FALLBACK_ORDER.map(ConnectionMethod::as_str),
            ["TLS", "STARTTLS", "Plaintext"]
        );
    }

    #[test]
    fn test_envelope_includes_bcc() {
        let email = Email::new()
            .to("alice@example.com")
            .cc("bob@example.com")
            .bcc("carol@bücher.example")
            .subject("s")
            .text_body("b");
        let envelope = build_envelope(&Address::new("noreply@example.com"), &email).unwrap();

        let to: Vec<String> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(
            to,
            vec![
                "alice@example.com",
                "bob@example.com",
                "carol@xn--bcher-kva.example"
            ]
        );
        assert_eq!(
            envelope.from().map(|a| a.to_string()).as_deref(),
            Some("noreply@example.com")
        );
    }

    #[test]
    fn test_builder_defaults() {
        let mailer = SmtpMailer::new("smtp.example.com", 587).build();
        assert_eq!(mailer.hostname, "smtp.example.com");
        assert!(mailer.sender().is_none());

        let mailer = SmtpMailer::new("smtp.example.com", 465)
            .hello_name("mail.budget.example")
            .from("noreply@budget.example")
            .build();
        assert_eq!(mailer.hostname, "mail.budget.example");
        assert_eq!(mailer.sender().map(|a| a.email.as_str()), Some("noreply@budget.example"));
    }

    #[test]
    fn test_invalid_sender_falls_back_to_configured() {
        let mailer = SmtpMailer::new("smtp.example.com", 587)
            .from("noreply@budget.example")
            .build();
        let email = Email::new().from("broken sender").to("a@example.com");
        assert_eq!(mailer.resolve_sender(&email).unwrap().email, "noreply@budget.example");

        let email = Email::new().from("owner@budget.example").to("a@example.com");
        assert_eq!(mailer.resolve_sender(&email).unwrap().email, "owner@budget.example");

        let unconfigured = SmtpMailer::new("smtp.example.com", 587).build();
        assert!(matches!(
            unconfigured.resolve_sender(&Email::new()),
            Err(MailError::MissingField("from"))
        ));
    }
}
