//! Bounded in-memory work queue.
//!
//! A minimal lock-free implementation of [`WorkQueue`] for embedding and
//! tests. Triage candidates and other work live in separate bounded queues;
//! triage is what the scheduler's feasibility check looks at.

use crossbeam_queue::ArrayQueue;

use crate::collab::WorkQueue;

/// Default capacity of each queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Bounded queue pair: triage candidates and other work items.
pub struct TriageQueue<T> {
    triage: ArrayQueue<T>,
    other: ArrayQueue<T>,
}

impl<T: Send> TriageQueue<T> {
    /// Create a queue pair, each half holding up to `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            triage: ArrayQueue::new(capacity),
            other: ArrayQueue::new(capacity),
        }
    }

    /// Enqueue a triage candidate. Returns the item back if the queue is full.
    pub fn push_triage(&self, item: T) -> Result<(), T> {
        self.triage.push(item)
    }

    /// Enqueue a non-triage item. Returns the item back if the queue is full.
    pub fn push_other(&self, item: T) -> Result<(), T> {
        self.other.push(item)
    }

    /// Number of queued non-triage items.
    pub fn pending_other(&self) -> usize {
        self.other.len()
    }
}

impl<T: Send> Default for TriageQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<T: Send> WorkQueue<T> for TriageQueue<T> {
    fn pending_triage(&self) -> usize {
        self.triage.len()
    }

    fn dequeue_triage(&self) -> Option<T> {
        self.triage.pop()
    }

    fn dequeue_other(&self) -> Option<T> {
        self.other.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_and_counts() {
        let q = TriageQueue::new(4);
        q.push_triage(1).unwrap();
        q.push_triage(2).unwrap();
        q.push_other(10).unwrap();
        assert_eq!(q.pending_triage(), 2);
        assert_eq!(q.pending_other(), 1);
        assert_eq!(q.dequeue_triage(), Some(1));
        assert_eq!(q.dequeue_triage(), Some(2));
        assert_eq!(q.dequeue_triage(), None);
        assert_eq!(q.dequeue_other(), Some(10));
    }

    #[test]
    fn test_full_queue_returns_item() {
        let q = TriageQueue::new(1);
        q.push_triage("a").unwrap();
        assert_eq!(q.push_triage("b"), Err("b"));
    }

    #[test]
    fn test_concurrent_dequeue_yields_each_item_once() {
        use std::thread;

        let q = Arc::new(TriageQueue::new(1000));
        for i in 0..1000 {
            q.push_triage(i).unwrap();
        }

        let mut handles = vec![];
        for _ in 0..4 {
            let q = q.clone();
            handles.push(thread::spawn(move || {
                let mut got = vec![];
                while let Some(x) = q.dequeue_triage() {
                    got.push(x);
                }
                got
            }));
        }

        let mut all: Vec<i32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
