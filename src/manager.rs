//! Email manager: provider registry, synchronous sends and enqueueing.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::address::Address;
use crate::config::{EmailConfig, DEFAULT_PROVIDER};
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::providers::{LocalMailer, LoggerMailer};
use crate::queue::TaskQueue;
use crate::task::{EmailTask, DEFAULT_PRIORITY, PRIORITY_HIGHEST, PRIORITY_LOWEST};

#[cfg(feature = "smtp")]
use crate::providers::SmtpMailer;

/// Knobs shared by the manager and the workers.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Upper bound for per-task `max_retries`, and the default.
    pub max_retries: u32,
    pub default_priority: u8,
    /// Sender filled in when a message has none.
    pub default_from: Option<Address>,
    /// Recipient of failure alerts.
    pub admin_address: String,
    pub retry_intervals: Vec<Duration>,
    pub workers: usize,
    pub poll_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&EmailConfig::default())
    }
}

impl From<&EmailConfig> for ManagerSettings {
    fn from(config: &EmailConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            default_priority: DEFAULT_PRIORITY,
            default_from: config.from.clone(),
            admin_address: config.admin_address.clone(),
            retry_intervals: config.retry_intervals.clone(),
            workers: config.workers,
            poll_interval: config.poll_interval,
        }
    }
}

/// Per-message overrides for [`EmailManager::queue_email_with`].
///
/// Out-of-range values are ignored and the defaults are used instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// 1 (most urgent) to 5.
    pub priority: Option<u8>,
    /// 1 up to the configured maximum.
    pub max_retries: Option<u32>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

struct Registry {
    providers: HashMap<String, Arc<dyn Mailer>>,
    default: String,
}

/// Owns the delivery providers and the entry points for sending mail.
///
/// ```
/// use courier::{Email, EmailManager, ManagerSettings, Mailer, TaskQueue};
/// use courier::providers::LocalMailer;
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// let mut providers: HashMap<String, Arc<dyn Mailer>> = HashMap::new();
/// providers.insert("local".into(), Arc::new(LocalMailer::new()));
///
/// let manager = EmailManager::new(providers, "local", ManagerSettings::default())
///     .unwrap()
///     .with_queue(Arc::new(TaskQueue::new()));
///
/// let email = Email::new()
///     .to("alice@example.com")
///     .subject("Budget exceeded")
///     .text_body("Dining out is 20% over budget.");
/// let task_id = manager.queue_email(email).unwrap();
/// assert!(!task_id.is_empty());
/// ```
pub struct EmailManager {
    registry: RwLock<Registry>,
    queue: RwLock<Option<Arc<TaskQueue>>>,
    settings: ManagerSettings,
}

impl EmailManager {
    /// Build a manager over `providers`.
    ///
    /// The default provider is `preferred` when registered, otherwise
    /// `"smtp"`. With neither available there is no usable default and
    /// construction fails.
    pub fn new(
        providers: HashMap<String, Arc<dyn Mailer>>,
        preferred: &str,
        settings: ManagerSettings,
    ) -> Result<Self, MailError> {
        if providers.is_empty() {
            return Err(MailError::Configuration(
                "no email provider is configured".into(),
            ));
        }
        if settings.max_retries == 0 {
            return Err(MailError::Configuration(
                "max_retries must be at least 1".into(),
            ));
        }

        let default = if providers.contains_key(preferred) {
            preferred.to_string()
        } else if providers.contains_key(DEFAULT_PROVIDER) {
            tracing::warn!(
                preferred = %preferred,
                fallback = DEFAULT_PROVIDER,
                "Preferred email provider not configured, falling back"
            );
            DEFAULT_PROVIDER.to_string()
        } else {
            return Err(MailError::Configuration(format!(
                "email provider '{}' is not configured and no '{}' fallback is available",
                preferred, DEFAULT_PROVIDER
            )));
        };

        tracing::info!(
            default = %default,
            providers = ?providers.keys().collect::<Vec<_>>(),
            "Email manager initialized"
        );

        Ok(Self {
            registry: RwLock::new(Registry { providers, default }),
            queue: RwLock::new(None),
            settings,
        })
    }

    /// Build a manager from configuration, registering only providers whose
    /// configuration is complete and enabled.
    pub fn from_config(config: &EmailConfig) -> Result<Self, MailError> {
        if !config.enabled {
            return Err(MailError::Configuration(
                "email is disabled (EMAIL_ENABLED=false)".into(),
            ));
        }

        let mut providers: HashMap<String, Arc<dyn Mailer>> = HashMap::new();

        register_smtp(config, &mut providers);

        match config.provider.as_str() {
            "logger" => {
                providers.insert("logger".into(), Arc::new(LoggerMailer::new()));
            }
            "logger_full" => {
                providers.insert("logger_full".into(), Arc::new(LoggerMailer::full()));
            }
            "local" => {
                providers.insert("local".into(), Arc::new(LocalMailer::new()));
            }
            _ => {}
        }

        Self::new(providers, &config.provider, ManagerSettings::from(config))
    }

    /// Wire the queue used by [`queue_email`](Self::queue_email).
    pub fn with_queue(self, queue: Arc<TaskQueue>) -> Self {
        self.set_queue(queue);
        self
    }

    pub fn set_queue(&self, queue: Arc<TaskQueue>) {
        *self.queue.write() = Some(queue);
    }

    pub fn queue(&self) -> Option<Arc<TaskQueue>> {
        self.queue.read().clone()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Send immediately through the default provider.
    pub async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        email.validate()?;
        let provider = self.default_provider_name();
        self.deliver_via(&provider, email).await
    }

    /// Send through a named provider, with audit logging.
    pub async fn deliver_via(
        &self,
        provider_name: &str,
        email: &Email,
    ) -> Result<DeliveryResult, MailError> {
        let mailer = self
            .provider(provider_name)
            .ok_or_else(|| MailError::UnknownProvider(provider_name.to_string()))?;
        let email = self.prepare_email(email);

        let span = tracing::info_span!(
            "courier.deliver",
            provider = %provider_name,
            to = %email.recipients_summary(),
            subject = %email.subject,
        );

        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = mailer.deliver(&email).instrument(span.clone()).await;

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            let status = if result.is_ok() { "success" } else { "error" };
            metrics::counter!("courier_emails_total", "provider" => provider_name.to_string(), "status" => status)
                .increment(1);
            metrics::histogram!("courier_delivery_duration_seconds", "provider" => provider_name.to_string())
                .record(duration);
        }

        span.in_scope(|| match &result {
            Ok(r) => tracing::info!(message_id = %r.message_id, "Email delivered"),
            Err(e) => tracing::error!(error = %e, "Email delivery failed"),
        });

        result
    }

    /// Validate and enqueue with default priority and retries.
    pub fn queue_email(&self, email: Email) -> Result<String, MailError> {
        self.queue_email_with(email, QueueOptions::default())
    }

    /// Validate and enqueue, returning the task ID.
    ///
    /// The task is bound to the default provider at this moment.
    pub fn queue_email_with(&self, email: Email, options: QueueOptions) -> Result<String, MailError> {
        let queue = self.queue().ok_or(MailError::QueueNotInitialized)?;
        email.validate()?;

        let priority = match options.priority {
            Some(p) if (PRIORITY_HIGHEST..=PRIORITY_LOWEST).contains(&p) => p,
            Some(p) => {
                tracing::warn!(priority = p, "Priority out of range, using default");
                self.settings.default_priority
            }
            None => self.settings.default_priority,
        };
        let max_retries = match options.max_retries {
            Some(n) if (1..=self.settings.max_retries).contains(&n) => n,
            Some(n) => {
                tracing::warn!(
                    max_retries = n,
                    limit = self.settings.max_retries,
                    "Max retries out of range, using default"
                );
                self.settings.max_retries
            }
            None => self.settings.max_retries,
        };

        let provider = self.default_provider_name();
        let task = EmailTask::new(email, provider, priority, max_retries).with_requested_at(Utc::now());
        let id = task.id().to_string();

        tracing::info!(
            task_id = %id,
            provider = %task.provider(),
            priority,
            max_retries,
            to = %task.email().recipients_summary(),
            subject = %task.email().subject,
            "Email queued"
        );
        queue.push(task);
        Ok(id)
    }

    /// Change the provider used for new work.
    pub fn set_default_provider(&self, name: &str) -> Result<(), MailError> {
        let mut registry = self.registry.write();
        if !registry.providers.contains_key(name) {
            return Err(MailError::UnknownProvider(name.to_string()));
        }
        if registry.default == name {
            return Err(MailError::AlreadyDefault(name.to_string()));
        }
        tracing::info!(from = %registry.default, to = %name, "Default email provider changed");
        registry.default = name.to_string();
        Ok(())
    }

    /// Probe every provider. Returns the first failure.
    pub async fn health_check(&self) -> Result<(), MailError> {
        let providers: Vec<(String, Arc<dyn Mailer>)> = {
            let registry = self.registry.read();
            let mut providers: Vec<_> = registry
                .providers
                .iter()
                .map(|(name, mailer)| (name.clone(), Arc::clone(mailer)))
                .collect();
            providers.sort_by(|a, b| a.0.cmp(&b.0));
            providers
        };

        for (name, mailer) in providers {
            if let Err(e) = mailer.health_check().await {
                tracing::warn!(provider = %name, error = %e, "Email provider health check failed");
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn Mailer>> {
        self.registry.read().providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn default_provider_name(&self) -> String {
        self.registry.read().default.clone()
    }

    fn prepare_email(&self, email: &Email) -> Email {
        let mut email = email.clone();
        if email.from.is_none() {
            email.from = self.settings.default_from.clone();
        }
        email
    }
}

#[cfg(feature = "smtp")]
fn register_smtp(config: &EmailConfig, providers: &mut HashMap<String, Arc<dyn Mailer>>) {
    if let Some(smtp) = SmtpMailer::from_config(&config.smtp, config.from.as_ref()) {
        providers.insert("smtp".into(), Arc::new(smtp));
    }
}

#[cfg(not(feature = "smtp"))]
fn register_smtp(config: &EmailConfig, _providers: &mut HashMap<String, Arc<dyn Mailer>>) {
    if config.smtp.is_usable() {
        tracing::warn!("SMTP is configured but the 'smtp' feature is not enabled");
    }
}
