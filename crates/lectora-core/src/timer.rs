//! Deadline queue for the delayed work the speech pipeline needs.
//!
//! The host owns the clock: tasks are scheduled relative to an `Instant`
//! supplied by the caller and drained with [`TimerQueue::take_due`].

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<Entry<T>>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry<T> {
    due: Instant,
    seq: u64,
    task: T,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, task: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.push(Entry { due, seq, task });
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, task: T) {
        self.schedule(now + delay, task);
    }

    /// Remove and return every task due at `now`, earliest first; ties keep
    /// scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.due <= now);
        self.entries = pending;
        due.sort_by_key(|entry| (entry.due, entry.seq));
        due.into_iter().map(|entry| entry.task).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.due).min()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|entry| keep(&entry.task));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::TimerQueue;
    use std::time::{Duration, Instant};

    #[test]
    fn drains_only_due_tasks_in_deadline_order() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule_after(start, Duration::from_millis(100), "late");
        queue.schedule_after(start, Duration::from_millis(50), "early");
        queue.schedule_after(start, Duration::from_millis(50), "early-second");

        assert!(queue.take_due(start).is_empty());
        assert_eq!(queue.next_deadline(), Some(start + Duration::from_millis(50)));

        let due = queue.take_due(start + Duration::from_millis(60));
        assert_eq!(due, vec!["early", "early-second"]);
        assert_eq!(queue.len(), 1);

        let due = queue.take_due(start + Duration::from_millis(100));
        assert_eq!(due, vec!["late"]);
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn retain_drops_matching_tasks() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(start, 1);
        queue.schedule(start, 2);
        queue.retain(|task| *task != 1);
        assert_eq!(queue.take_due(start), vec![2]);
    }
}
