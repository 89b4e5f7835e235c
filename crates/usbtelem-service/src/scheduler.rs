//! Cooperative timer queue for the periodic link tasks.
//!
//! The scheduler does not run anything itself: the service loop sleeps until
//! [`Scheduler::next_deadline`], then drains [`Scheduler::pop_due`] and runs
//! each task inline. Entries are ordered by `(deadline, sequence)`, so tasks
//! due at the same instant come out in the order they were posted.
//!
//! Deadlines use [`tokio::time::Instant`], which follows the paused clock in
//! tests.
//!
//! # Examples
//!
//! ```
//! use usbtelem_service::scheduler::{Scheduler, Task};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.post(Task::Telemetry);
//! scheduler.post_delayed(Task::Read, Duration::from_secs(60));
//!
//! assert_eq!(scheduler.pop_due(Instant::now()), Some(Task::Telemetry));
//! assert_eq!(scheduler.pop_due(Instant::now()), None);
//!
//! scheduler.cancel(Task::Read);
//! assert!(scheduler.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// The periodic jobs of an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Send one telemetry frame.
    Telemetry,

    /// Poll the port for inbound bytes.
    Read,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry => write!(f, "telemetry"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Single-threaded timer queue.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BTreeMap<(Instant, u64), Task>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `task` runnable on the next cycle.
    pub fn post(&mut self, task: Task) {
        self.post_at(Instant::now(), task);
    }

    /// Make `task` runnable no earlier than `delay` from now.
    pub fn post_delayed(&mut self, task: Task, delay: Duration) {
        self.post_at(Instant::now() + delay, task);
    }

    fn post_at(&mut self, deadline: Instant, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((deadline, seq), task);
    }

    /// Remove every pending occurrence of `task`, due or not.
    ///
    /// Returns how many entries were removed.
    pub fn cancel(&mut self, task: Task) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, queued| *queued != task);
        before - self.queue.len()
    }

    /// Remove and return the earliest task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Task> {
        let entry = self.queue.first_entry()?;
        if entry.key().0 > now {
            return None;
        }
        Some(entry.remove())
    }

    /// Deadline of the earliest pending task.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn is_scheduled(&self, task: Task) -> bool {
        self.queue.values().any(|queued| *queued == task)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_equal_deadlines_run_in_posting_order() {
        let mut scheduler = Scheduler::new();
        scheduler.post(Task::Read);
        scheduler.post(Task::Telemetry);
        scheduler.post(Task::Read);

        let now = Instant::now();
        assert_eq!(scheduler.pop_due(now), Some(Task::Read));
        assert_eq!(scheduler.pop_due(now), Some(Task::Telemetry));
        assert_eq!(scheduler.pop_due(now), Some(Task::Read));
        assert_eq!(scheduler.pop_due(now), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_waits_for_deadline() {
        let mut scheduler = Scheduler::new();
        scheduler.post_delayed(Task::Telemetry, Duration::from_millis(500));

        assert_eq!(scheduler.pop_due(Instant::now()), None);
        assert_eq!(
            scheduler.next_deadline(),
            Some(Instant::now() + Duration::from_millis(500))
        );

        tokio::time::advance(Duration::from_millis(499)).await;
        assert_eq!(scheduler.pop_due(Instant::now()), None);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(scheduler.pop_due(Instant::now()), Some(Task::Telemetry));
        assert!(scheduler.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins_over_posting_order() {
        let mut scheduler = Scheduler::new();
        scheduler.post_delayed(Task::Telemetry, Duration::from_millis(500));
        scheduler.post_delayed(Task::Read, Duration::from_millis(100));

        tokio::time::advance(Duration::from_secs(1)).await;
        let now = Instant::now();
        assert_eq!(scheduler.pop_due(now), Some(Task::Read));
        assert_eq!(scheduler.pop_due(now), Some(Task::Telemetry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_due_and_pending_occurrences() {
        let mut scheduler = Scheduler::new();
        scheduler.post(Task::Telemetry);
        scheduler.post_delayed(Task::Telemetry, Duration::from_millis(500));
        scheduler.post_delayed(Task::Read, Duration::from_millis(100));

        assert!(scheduler.is_scheduled(Task::Telemetry));
        assert_eq!(scheduler.cancel(Task::Telemetry), 2);
        assert!(!scheduler.is_scheduled(Task::Telemetry));
        assert_eq!(scheduler.len(), 1);

        assert_eq!(scheduler.cancel(Task::Telemetry), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(scheduler.pop_due(Instant::now()), Some(Task::Read));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut scheduler = Scheduler::new();
        scheduler.post(Task::Telemetry);
        scheduler.post(Task::Read);
        scheduler.clear();

        assert!(scheduler.is_empty());
        assert_eq!(scheduler.pop_due(Instant::now()), None);
    }

    #[test]
    fn test_task_display() {
        assert_eq!(Task::Telemetry.to_string(), "telemetry");
        assert_eq!(Task::Read.to_string(), "read");
    }
}
