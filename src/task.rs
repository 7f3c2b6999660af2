//! Queued email tasks and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::email::Email;

/// Highest priority (served first).
pub const PRIORITY_HIGHEST: u8 = 1;
/// Lowest priority (served last).
pub const PRIORITY_LOWEST: u8 = 5;
/// Priority assigned when the caller does not pick one.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Metadata `type` value carried by administrative alert emails.
pub const ADMIN_ALERT_TYPE: &str = "admin_failure_alert";

/// Lifecycle state of a task.
///
/// `Sent` and `Failed` are terminal. A task that is being retried is still
/// `Queued`; see [`EmailTask::is_retrying`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Sent,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// One unit of work: an email bound to a provider, with retry bookkeeping.
///
/// Fields are private so that `retry_count <= max_retries` holds after every
/// mutation, and a task whose retry count reached its maximum is `Failed`.
/// Deserialized tasks are checked against the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct EmailTask {
    id: String,
    email: Email,
    provider: String,
    retry_count: u32,
    max_retries: u32,
    priority: u8,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested_at: Option<DateTime<Utc>>,
}

/// Wire shape of [`EmailTask`], validated before it becomes a task.
#[derive(Deserialize)]
struct TaskRecord {
    id: String,
    email: Email,
    provider: String,
    retry_count: u32,
    max_retries: u32,
    priority: u8,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    #[serde(default)]
    requested_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRecord> for EmailTask {
    type Error = String;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.max_retries == 0 {
            return Err("max_retries must be at least 1".into());
        }
        if record.retry_count > record.max_retries {
            return Err(format!(
                "retry_count {} exceeds max_retries {}",
                record.retry_count, record.max_retries
            ));
        }
        if record.retry_count == record.max_retries && record.status != TaskStatus::Failed {
            return Err(format!(
                "task at max_retries must be failed, found {}",
                record.status.as_str()
            ));
        }

        Ok(Self {
            id: record.id,
            email: record.email,
            provider: record.provider,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
            priority: record.priority,
            status: record.status,
            created_at: record.created_at,
            requested_at: record.requested_at,
        })
    }
}

impl EmailTask {
    /// Create a queued task with a fresh ID. `max_retries` is raised to 1
    /// when lower: every task gets at least one attempt.
    pub fn new(email: Email, provider: impl Into<String>, priority: u8, max_retries: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            provider: provider.into(),
            retry_count: 0,
            max_retries: max_retries.max(1),
            priority,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            requested_at: None,
        }
    }

    /// Record when the caller asked for the email.
    pub fn with_requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Name of the provider bound at enqueue time.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Still queued, with at least one failed attempt behind it.
    pub fn is_retrying(&self) -> bool {
        self.status == TaskStatus::Queued && self.retry_count > 0
    }

    /// Whether this task carries an administrative failure alert.
    pub fn is_admin_alert(&self) -> bool {
        self.email.metadata_value("type") == Some(ADMIN_ALERT_TYPE)
    }

    /// Count one failed delivery attempt.
    ///
    /// The count saturates at `max_retries`; reaching it finalizes the task
    /// as `Failed`. Returns the new retry count. Terminal tasks are left
    /// untouched.
    pub fn record_failure(&mut self) -> u32 {
        if self.is_terminal() {
            return self.retry_count;
        }
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
        }
        if self.retry_count >= self.max_retries {
            self.status = TaskStatus::Failed;
        }
        self.retry_count
    }

    /// Finalize as delivered. Terminal tasks are left untouched.
    pub fn mark_sent(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Sent;
    }

    /// Finalize as failed without further retries.
    pub fn mark_failed(&mut self) {
        self.retry_count = self.max_retries;
        self.status = TaskStatus::Failed;
    }
}
