//! Priority queue of pending email tasks.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;

use crate::task::EmailTask;

/// Heap entry ordered so that the lowest priority value is the max element.
#[derive(Debug)]
struct Entry(EmailTask);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority() == other.0.priority()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.priority().cmp(&self.0.priority())
    }
}

/// Thread-safe min-priority queue of [`EmailTask`]s.
///
/// `pop` returns the task with the numerically smallest priority. Tasks of
/// equal priority come out in no particular order. The lock is held only for
/// the heap operation itself.
///
/// ```
/// use courier::{Email, EmailTask, TaskQueue};
///
/// let queue = TaskQueue::new();
/// let email = Email::new().to("a@example.com").subject("s").text_body("b");
/// queue.push(EmailTask::new(email.clone(), "smtp", 4, 3));
/// queue.push(EmailTask::new(email, "smtp", 1, 3));
///
/// assert_eq!(queue.pop().map(|t| t.priority()), Some(1));
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and wake one waiting worker.
    pub fn push(&self, task: EmailTask) {
        let depth = {
            let mut heap = self.heap.lock();
            heap.push(Entry(task));
            heap.len()
        };
        record_depth(depth);
        self.notify.notify_one();
    }

    /// Remove the most urgent task, or `None` when empty.
    pub fn pop(&self) -> Option<EmailTask> {
        let (task, depth) = {
            let mut heap = self.heap.lock();
            let task = heap.pop().map(|Entry(task)| task);
            (task, heap.len())
        };
        if task.is_some() {
            record_depth(depth);
        }
        task
    }

    /// Priority of the task `pop` would return next.
    pub fn peek_priority(&self) -> Option<u8> {
        self.heap.lock().peek().map(|Entry(task)| task.priority())
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Drop every pending task. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut heap = self.heap.lock();
        let count = heap.len();
        heap.clear();
        drop(heap);
        record_depth(0);
        count
    }

    /// Resolves after the next `push`, or immediately if a push happened
    /// since the last wake-up that nobody consumed.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(feature = "metrics")]
fn record_depth(depth: usize) {
    metrics::gauge!("courier_queue_depth").set(depth as f64);
}

#[cfg(not(feature = "metrics"))]
fn record_depth(_depth: usize) {}
