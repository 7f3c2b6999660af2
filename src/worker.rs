//! Worker pool draining the task queue.
//!
//! Each worker pops the most urgent task, delivers it through the provider
//! bound on the task and applies the retry state machine:
//!
//! ```text
//! queued --(delivered)----------------------------> sent
//! queued --(failed, retries left)-----------------> parked --(backoff)--> queued
//! queued --(failed, retries used up)--------------> failed --> admin alert task
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use courier::{Dispatcher, EmailConfig, EmailManager};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = EmailConfig::from_env()?;
//! let manager = Arc::new(EmailManager::from_config(&config)?);
//! let dispatcher = Dispatcher::from_manager(manager.clone());
//! let pool = dispatcher.start(config.workers, CancellationToken::new());
//!
//! manager.queue_email(email)?;
//!
//! pool.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::email::Email;
use crate::error::MailError;
use crate::manager::EmailManager;
use crate::queue::TaskQueue;
use crate::retry::RetryPolicy;
use crate::task::{EmailTask, ADMIN_ALERT_TYPE, PRIORITY_HIGHEST};

/// What happened to a task handed to [`Dispatcher::process_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Delivered.
    Sent,
    /// Already terminal; nothing was sent.
    Skipped,
    /// Failed and parked; it goes back on the queue after this delay.
    Rescheduled(Duration),
    /// Failed for good.
    Failed,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Rescheduled(_) => "rescheduled",
            Self::Failed => "failed",
        }
    }
}

/// Shared state of the workers: manager, queue and retry policy.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<EmailManager>,
    queue: Arc<TaskQueue>,
    retry: Arc<RetryPolicy>,
}

impl Dispatcher {
    /// Wire a dispatcher. The queue is handed to the manager if it has none
    /// yet. A manager already feeding a different queue is a configuration
    /// error: its tasks would never reach these workers.
    pub fn new(
        manager: Arc<EmailManager>,
        queue: Arc<TaskQueue>,
        retry: Arc<RetryPolicy>,
    ) -> Result<Self, MailError> {
        match manager.queue() {
            Some(existing) if !Arc::ptr_eq(&existing, &queue) => {
                return Err(MailError::Configuration(
                    "email manager is already wired to a different task queue".into(),
                ));
            }
            Some(_) => {}
            None => manager.set_queue(Arc::clone(&queue)),
        }
        Ok(Self {
            manager,
            queue,
            retry,
        })
    }

    /// Use the manager's queue (creating one if needed) and a retry policy
    /// built from its settings.
    pub fn from_manager(manager: Arc<EmailManager>) -> Self {
        let queue = manager.queue().unwrap_or_else(|| {
            let queue = Arc::new(TaskQueue::new());
            manager.set_queue(Arc::clone(&queue));
            queue
        });
        let retry = Arc::new(RetryPolicy::new(manager.settings().retry_intervals.clone()));
        Self {
            manager,
            queue,
            retry,
        }
    }

    pub fn manager(&self) -> &Arc<EmailManager> {
        &self.manager
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn retry_policy(&self) -> &Arc<RetryPolicy> {
        &self.retry
    }

    /// Spawn `workers` poll loops (at least one) on the current runtime.
    pub fn start(&self, workers: usize, token: CancellationToken) -> WorkerPool {
        let workers = workers.max(1);
        let poll_interval = self.manager.settings().poll_interval;
        info!(workers, ?poll_interval, "Starting email workers");

        let handles = (0..workers)
            .map(|id| {
                let dispatcher = self.clone();
                let token = token.clone();
                tokio::spawn(async move { dispatcher.run(id, token, poll_interval).await })
            })
            .collect();

        WorkerPool { token, handles }
    }

    async fn run(&self, worker_id: usize, token: CancellationToken, poll_interval: Duration) {
        debug!(worker_id, "Email worker started");

        loop {
            if token.is_cancelled() {
                break;
            }

            match self.queue.pop() {
                Some(task) => {
                    self.process_task(task).await;
                }
                None => {
                    tokio::select! {
                        () = self.queue.notified() => {}
                        () = tokio::time::sleep(poll_interval) => {}
                        () = token.cancelled() => break,
                    }
                }
            }
        }

        debug!(worker_id, "Email worker stopped");
    }

    /// Run one task through the state machine.
    pub async fn process_task(&self, mut task: EmailTask) -> TaskOutcome {
        if task.is_terminal() {
            debug!(task_id = %task.id(), status = task.status().as_str(), "Skipping finished task");
            return record(TaskOutcome::Skipped);
        }

        let attempt = task.retry_count() + 1;
        let result = self.manager.deliver_via(task.provider(), task.email()).await;

        let outcome = match result {
            Ok(delivery) => {
                task.mark_sent();
                self.retry.remove_task(task.id());
                info!(
                    task_id = %task.id(),
                    provider = %task.provider(),
                    message_id = %delivery.message_id,
                    attempt,
                    "Queued email sent"
                );
                TaskOutcome::Sent
            }
            Err(e) => self.handle_failure(task, attempt, e),
        };
        record(outcome)
    }

    fn handle_failure(&self, mut task: EmailTask, attempt: u32, error: MailError) -> TaskOutcome {
        if error.is_validation() {
            task.mark_failed();
        } else {
            task.record_failure();
        }

        if !task.is_terminal() {
            let delay = self
                .retry
                .interval_for(task.retry_count().saturating_sub(1) as usize);
            warn!(
                task_id = %task.id(),
                provider = %task.provider(),
                retry_count = task.retry_count(),
                max_retries = task.max_retries(),
                ?delay,
                error = %error,
                "Email delivery failed, retry scheduled"
            );

            let id = task.id().to_string();
            if let Err(e) = self.retry.save_failed_task(task) {
                error!(task_id = %id, error = %e, "Could not park task for retry");
                return TaskOutcome::Failed;
            }
            self.schedule_requeue(id, delay);
            return TaskOutcome::Rescheduled(delay);
        }

        self.retry.remove_task(task.id());
        error!(
            task_id = %task.id(),
            provider = %task.provider(),
            attempts = attempt,
            to = %task.email().recipients_summary(),
            subject = %task.email().subject,
            error = %error,
            "Email delivery failed permanently"
        );

        if task.is_admin_alert() {
            error!(task_id = %task.id(), "Admin alert could not be delivered");
        } else {
            self.enqueue_alert(&task, attempt, &error);
        }
        TaskOutcome::Failed
    }

    /// Put the task back on the queue once `delay` has passed.
    ///
    /// The timer is detached and outlives worker shutdown. It only pushes the
    /// task if it is still parked, so a sweep that got there first wins.
    fn schedule_requeue(&self, task_id: String, delay: Duration) {
        let retry = Arc::clone(&self.retry);
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(task) = retry.take_task(&task_id) {
                debug!(task_id = %task_id, "Requeueing task after backoff");
                queue.push(task);
            }
        });
    }

    /// Push every eligible parked task back on the queue now.
    pub fn retry_failed_tasks(&self) -> usize {
        let tasks = self.retry.take_failed_tasks();
        let count = tasks.len();
        for task in tasks {
            self.queue.push(task);
        }
        if count > 0 {
            info!(count, "Requeued parked email tasks");
        }
        count
    }

    fn enqueue_alert(&self, task: &EmailTask, attempts: u32, error: &MailError) {
        let alert = build_alert(&self.manager.settings().admin_address, task, attempts, error);
        let provider = self.manager.default_provider_name();
        // One attempt, never retried.
        let alert_task = EmailTask::new(alert, provider, PRIORITY_HIGHEST, 1);
        info!(
            task_id = %alert_task.id(),
            failed_task_id = %task.id(),
            "Admin alert queued"
        );
        self.queue.push(alert_task);
    }
}

/// Handle to running workers.
pub struct WorkerPool {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Stop polling and wait for every worker. Sends already in flight
    /// complete first.
    pub async fn shutdown(self) {
        info!(workers = self.handles.len(), "Stopping email workers");
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Email worker panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether every worker has exited.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

fn build_alert(admin: &str, task: &EmailTask, attempts: u32, error: &MailError) -> Email {
    let email = task.email();
    let recipients = email
        .all_recipients()
        .iter()
        .map(|a| a.email.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let html = format!(
        "<h2>Email delivery failed</h2>\
         <p>An email could not be delivered after {attempts} attempt(s).</p>\
         <ul>\
         <li><strong>Task ID:</strong> {id}</li>\
         <li><strong>Recipients:</strong> {recipients}</li>\
         <li><strong>Subject:</strong> {subject}</li>\
         <li><strong>Provider:</strong> {provider}</li>\
         <li><strong>Priority:</strong> {priority}</li>\
         <li><strong>Last error:</strong> {error}</li>\
         </ul>",
        id = escape_html(task.id()),
        recipients = escape_html(&recipients),
        subject = escape_html(&email.subject),
        provider = escape_html(task.provider()),
        priority = task.priority(),
        error = escape_html(&error.to_string()),
    );

    Email::new()
        .to(admin)
        .subject(format!("[ALERT] Email delivery failed: {}", email.subject))
        .html_body(html)
        .metadata("type", ADMIN_ALERT_TYPE)
        .metadata("failed_task_id", task.id())
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(feature = "metrics")]
fn record(outcome: TaskOutcome) -> TaskOutcome {
    metrics::counter!("courier_tasks_total", "outcome" => outcome.as_str()).increment(1);
    outcome
}

#[cfg(not(feature = "metrics"))]
fn record(outcome: TaskOutcome) -> TaskOutcome {
    outcome
}
