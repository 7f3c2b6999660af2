//! Environment-based configuration.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `EMAIL_ENABLED` | Master switch | `true` |
//! | `EMAIL_PROVIDER` | Preferred default provider: `smtp`, `logger`, `logger_full`, `local` | `smtp` |
//! | `EMAIL_FROM` | Default sender email | |
//! | `EMAIL_FROM_NAME` | Default sender name | |
//! | `EMAIL_MAX_RETRIES` | Upper bound on attempts per task | `3` |
//! | `EMAIL_RETRY_INTERVALS` | Backoff schedule, comma-separated seconds | `60,300,600` |
//! | `EMAIL_WORKERS` | Worker count | `4` |
//! | `EMAIL_POLL_INTERVAL_MS` | Idle poll interval | `1000` |
//! | `EMAIL_ADMIN_ADDRESS` | Recipient of failure alerts | `admin@localhost` |
//! | `SMTP_ENABLED` | SMTP switch | `true` |
//! | `SMTP_HOST` | SMTP server host | |
//! | `SMTP_PORT` | SMTP server port | `587` |
//! | `SMTP_USERNAME` | SMTP username | |
//! | `SMTP_PASSWORD` | SMTP password | |
//! | `SMTP_FROM_EMAIL` | SMTP sender, overrides `EMAIL_FROM` | |
//! | `SMTP_ACCEPT_INVALID_CERTS` | Skip certificate verification | `false` |
//! | `SMTP_TIMEOUT_SECS` | Per-connection timeout | `10` |
//! | `SMTP_HELO_NAME` | EHLO name and Message-ID domain | `SMTP_HOST` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::address::Address;
use crate::error::MailError;
use crate::retry::DEFAULT_RETRY_INTERVALS;

pub const DEFAULT_PROVIDER: &str = "smtp";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_ADMIN_ADDRESS: &str = "admin@localhost";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
    pub helo_name: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: None,
            port: DEFAULT_SMTP_PORT,
            username: None,
            password: None,
            from_email: None,
            accept_invalid_certs: false,
            timeout: DEFAULT_SMTP_TIMEOUT,
            helo_name: None,
        }
    }
}

impl SmtpConfig {
    /// Enabled and pointing at a host.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from_email", &self.from_email)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .field("helo_name", &self.helo_name)
            .finish()
    }
}

/// Email subsystem settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    /// Preferred default provider name
    pub provider: String,
    /// Default sender
    pub from: Option<Address>,
    pub max_retries: u32,
    pub retry_intervals: Vec<Duration>,
    pub workers: usize,
    pub poll_interval: Duration,
    pub admin_address: String,
    pub smtp: SmtpConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: DEFAULT_PROVIDER.to_string(),
            from: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_intervals: DEFAULT_RETRY_INTERVALS.to_vec(),
            workers: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            admin_address: DEFAULT_ADMIN_ADDRESS.to_string(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl EmailConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    ///
    /// ```
    /// use courier::EmailConfig;
    ///
    /// let config = EmailConfig::from_lookup(|key| match key {
    ///     "SMTP_HOST" => Some("smtp.example.com".to_string()),
    ///     "EMAIL_RETRY_INTERVALS" => Some("30, 120".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.smtp.port, 587);
    /// assert_eq!(config.retry_intervals.len(), 2);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MailError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let from = match get("EMAIL_FROM") {
            Some(email) => Some(match get("EMAIL_FROM_NAME") {
                Some(name) => Address::with_name(name, email),
                None => Address::new(email),
            }),
            None => None,
        };

        let retry_intervals = match get("EMAIL_RETRY_INTERVALS") {
            Some(raw) => parse_intervals(&raw)?,
            None => defaults.retry_intervals,
        };

        let max_retries = parse_number(&get, "EMAIL_MAX_RETRIES", defaults.max_retries)?;
        if max_retries == 0 {
            return Err(MailError::Configuration(
                "EMAIL_MAX_RETRIES must be at least 1".into(),
            ));
        }

        let admin_address = match get("EMAIL_ADMIN_ADDRESS") {
            Some(raw) => Address::parse(&raw)
                .map_err(|_| {
                    MailError::Configuration(format!(
                        "EMAIL_ADMIN_ADDRESS must be a valid email address, got '{raw}'"
                    ))
                })?
                .email,
            None => defaults.admin_address,
        };

        let smtp_defaults = SmtpConfig::default();
        let smtp = SmtpConfig {
            enabled: parse_bool(&get, "SMTP_ENABLED", smtp_defaults.enabled)?,
            host: get("SMTP_HOST"),
            port: parse_number(&get, "SMTP_PORT", smtp_defaults.port)?,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from_email: get("SMTP_FROM_EMAIL"),
            accept_invalid_certs: parse_bool(
                &get,
                "SMTP_ACCEPT_INVALID_CERTS",
                smtp_defaults.accept_invalid_certs,
            )?,
            timeout: Duration::from_secs(parse_number(
                &get,
                "SMTP_TIMEOUT_SECS",
                smtp_defaults.timeout.as_secs(),
            )?),
            helo_name: get("SMTP_HELO_NAME"),
        };

        Ok(Self {
            enabled: parse_bool(&get, "EMAIL_ENABLED", defaults.enabled)?,
            provider: get("EMAIL_PROVIDER")
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or(defaults.provider),
            from,
            max_retries,
            retry_intervals,
            workers: parse_number(&get, "EMAIL_WORKERS", defaults.workers)?,
            poll_interval: Duration::from_millis(parse_number(
                &get,
                "EMAIL_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            admin_address,
            smtp,
        })
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T, MailError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| {
            MailError::Configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, MailError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(MailError::Configuration(format!(
                "{key} must be a boolean, got '{v}'"
            ))),
        },
    }
}

fn parse_intervals(raw: &str) -> Result<Vec<Duration>, MailError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                MailError::Configuration(format!(
                    "EMAIL_RETRY_INTERVALS entries must be whole seconds, got '{s}'"
                ))
            })
        })
        .collect()
}
