//! Retry backoff schedule and the store of parked tasks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::MailError;
use crate::task::EmailTask;

/// Backoff used when no intervals are configured: 1, 5 and 10 minutes.
pub const DEFAULT_RETRY_INTERVALS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
];

/// Backoff schedule plus an in-memory table of tasks waiting to be retried.
///
/// A task is parked while its backoff timer runs. Whoever takes it out of the
/// table (the timer or [`take_failed_tasks`](Self::take_failed_tasks)) owns
/// the re-push, so a parked task is requeued once.
///
/// The table lives in memory only; parked tasks are lost on restart.
///
/// ```
/// use courier::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(vec![Duration::from_secs(30), Duration::from_secs(90)]);
/// assert_eq!(policy.interval_for(0), Duration::from_secs(30));
/// assert_eq!(policy.interval_for(7), Duration::from_secs(90));
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
    parked: Mutex<HashMap<String, EmailTask>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RetryPolicy {
    /// Create a policy. An empty schedule falls back to
    /// [`DEFAULT_RETRY_INTERVALS`].
    pub fn new(intervals: Vec<Duration>) -> Self {
        let intervals = if intervals.is_empty() {
            DEFAULT_RETRY_INTERVALS.to_vec()
        } else {
            intervals
        };
        Self {
            intervals,
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Backoff before retry number `attempt` (0-based). Attempts past the
    /// end of the schedule reuse the last interval.
    pub fn interval_for(&self, attempt: usize) -> Duration {
        self.intervals
            .get(attempt)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or_default()
    }

    /// Whether a task may be attempted again.
    pub fn is_eligible(&self, task: &EmailTask) -> bool {
        !task.is_terminal() && task.retry_count() < task.max_retries()
    }

    /// Park a task until its retry is due.
    pub fn save_failed_task(&self, task: EmailTask) -> Result<(), MailError> {
        if !self.is_eligible(&task) {
            return Err(MailError::RetriesExhausted {
                task_id: task.id().to_string(),
                attempts: task.retry_count(),
            });
        }
        tracing::debug!(task_id = %task.id(), retry_count = task.retry_count(), "Parked task for retry");
        self.parked.lock().insert(task.id().to_string(), task);
        Ok(())
    }

    /// Snapshot of the parked tasks that are still eligible.
    pub fn failed_tasks(&self) -> Vec<EmailTask> {
        self.parked
            .lock()
            .values()
            .filter(|t| self.is_eligible(t))
            .cloned()
            .collect()
    }

    /// Remove and return every eligible parked task.
    pub fn take_failed_tasks(&self) -> Vec<EmailTask> {
        let mut parked = self.parked.lock();
        let ids: Vec<String> = parked
            .values()
            .filter(|t| self.is_eligible(t))
            .map(|t| t.id().to_string())
            .collect();
        ids.iter().filter_map(|id| parked.remove(id)).collect()
    }

    /// Remove and return one parked task.
    pub fn take_task(&self, id: &str) -> Option<EmailTask> {
        self.parked.lock().remove(id)
    }

    /// Forget a parked task. Returns whether it was present.
    pub fn remove_task(&self, id: &str) -> bool {
        self.parked.lock().remove(id).is_some()
    }

    pub fn has_failed_task(&self, id: &str) -> bool {
        self.parked.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }

    pub fn clear(&self) {
        self.parked.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Email;

    fn task(max_retries: u32) -> EmailTask {
        let email = Email::new().to("a@example.com").subject("s").text_body("b");
        EmailTask::new(email, "smtp", 3, max_retries)
    }

    #[test]
    fn test_empty_schedule_uses_defaults() {
        let policy = RetryPolicy::new(vec![]);
        assert_eq!(policy.interval_for(0), Duration::from_secs(60));
        assert_eq!(policy.interval_for(1), Duration::from_secs(300));
        assert_eq!(policy.interval_for(2), Duration::from_secs(600));
        assert_eq!(policy.interval_for(usize::MAX), Duration::from_secs(600));
    }

    #[test]
    fn test_eligibility() {
        let policy = RetryPolicy::default();
        let mut t = task(2);
        assert!(policy.is_eligible(&t));
        t.record_failure();
        assert!(policy.is_eligible(&t));
        t.record_failure();
        assert!(!policy.is_eligible(&t));

        let mut sent = task(2);
        sent.mark_sent();
        assert!(!policy.is_eligible(&sent));
    }

    #[test]
    fn test_save_rejects_exhausted() {
        let policy = RetryPolicy::default();
        let mut t = task(1);
        t.record_failure();
        let err = policy.save_failed_task(t).unwrap_err();
        assert!(matches!(err, MailError::RetriesExhausted { attempts: 1, .. }));
        assert!(policy.is_empty());
    }

    #[test]
    fn test_take_is_exclusive() {
        let policy = RetryPolicy::default();
        let mut t = task(3);
        t.record_failure();
        let id = t.id().to_string();
        policy.save_failed_task(t).unwrap();

        assert!(policy.has_failed_task(&id));
        assert_eq!(policy.failed_tasks().len(), 1);
        assert!(policy.take_task(&id).is_some());
        assert!(policy.take_task(&id).is_none());
        assert!(policy.take_failed_tasks().is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let policy = RetryPolicy::default();
        let a = task(3);
        let a_id = a.id().to_string();
        policy.save_failed_task(a).unwrap();
        policy.save_failed_task(task(3)).unwrap();

        assert!(policy.remove_task(&a_id));
        assert!(!policy.remove_task(&a_id));
        assert_eq!(policy.len(), 1);
        policy.clear();
        assert!(policy.is_empty());
    }

    #[test]
    fn test_parked_tasks_do_not_survive_a_new_policy() {
        // In-memory only: a restart (new policy) starts empty.
        let policy = RetryPolicy::default();
        policy.save_failed_task(task(3)).unwrap();
        drop(policy);
        assert!(RetryPolicy::default().failed_tasks().is_empty());
    }
}
