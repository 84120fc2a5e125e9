//! Multi-producer, multi-consumer dispatch queue with a discard-oldest
//! admission policy.
//!
//! Producers never wait: at capacity the oldest pending task is evicted to
//! make room for the new one. With no capacity configured the queue is
//! unbounded and never evicts anything.

use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

/// What happened to a pushed task.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// Queued without displacing anything.
    Accepted,
    /// Queued; the returned task was evicted to make room.
    DisplacedOldest(T),
    /// Not queued because the queue is closed; the task is handed back.
    Refused(T),
}

#[derive(Debug)]
struct QueueState<T> {
    tasks: VecDeque<T>,
    closed: bool,
}

/// FIFO queue shared by the submitting side and every worker.
#[derive(Debug)]
pub struct DispatchQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
    capacity: Option<NonZeroUsize>,
}

impl<T> DispatchQueue<T> {
    /// Creates a queue; `None` means unbounded.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            state: Mutex::new(QueueState { tasks: VecDeque::new(), closed: false }),
            available: Notify::new(),
            capacity,
        }
    }

    /// Creates an unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `task` without waiting.
    pub fn push(&self, task: T) -> Admission<T> {
        let mut state = self.lock();
        if state.closed {
            return Admission::Refused(task);
        }

        let displaced = match self.capacity {
            Some(capacity) if state.tasks.len() >= capacity.get() => state.tasks.pop_front(),
            _ => None,
        };
        state.tasks.push_back(task);
        drop(state);

        self.available.notify_one();
        match displaced {
            Some(oldest) => Admission::DisplacedOldest(oldest),
            None => Admission::Accepted,
        }
    }

    /// Waits for the next task. Returns `None` once the queue is closed and
    /// empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(task) = state.tasks.pop_front() {
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops admitting tasks and wakes every waiting consumer. Tasks already
    /// queued stay available to [`pop`](Self::pop).
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Removes and returns every queued task.
    pub fn drain(&self) -> Vec<T> {
        self.lock().tasks.drain(..).collect()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Configured capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    fn bounded(capacity: usize) -> DispatchQueue<u32> {
        DispatchQueue::new(NonZeroUsize::new(capacity))
    }

    #[test]
    fn full_queue_discards_oldest() {
        let queue = bounded(2);

        assert_eq!(queue.push(1), Admission::Accepted);
        assert_eq!(queue.push(2), Admission::Accepted);
        assert_eq!(queue.push(3), Admission::DisplacedOldest(1));

        assert_eq!(queue.drain(), vec![2, 3]);
    }

    #[test]
    fn unbounded_queue_never_discards() {
        let queue = DispatchQueue::unbounded();

        for task in 0..10_000 {
            assert_eq!(queue.push(task), Admission::Accepted);
        }
        assert_eq!(queue.len(), 10_000);
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn closed_queue_refuses_tasks() {
        let queue = bounded(4);
        queue.push(1);
        queue.close();

        assert_eq!(queue.push(2), Admission::Refused(2));
        assert!(queue.is_closed());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn pop_returns_in_fifo_order() {
        let queue = bounded(8);
        queue.push(1);
        queue.push(2);

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = Arc::new(bounded(8));
        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(7);

        let popped = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(popped, Some(7));
    }

    #[tokio::test]
    async fn close_wakes_idle_consumers_after_remaining_tasks() {
        let queue = Arc::new(bounded(8));
        queue.push(1);

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.pop().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let mut results = Vec::new();
        for consumer in consumers {
            results.push(tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, vec![None, None, Some(1)]);
    }
}
