//! Delivery workers and the counters they maintain.
//!
//! A worker pulls events from the shared [`DispatchQueue`] until the queue
//! is closed and empty or its cancellation token fires, and runs each one
//! through the [`Dispatcher`].

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use badger_core::ErrorEvent;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{dispatch::Dispatcher, queue::DispatchQueue, retry::DeliveryStatus};

/// Scheduling priority of delivery workers relative to application work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPriority {
    /// Yield to the scheduler before every dispatch.
    #[default]
    Low,
    /// Dispatch as soon as a task is available.
    Normal,
}

impl FromStr for WorkerPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            other => Err(format!("unknown worker priority '{other}', expected 'low' or 'normal'")),
        }
    }
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers currently running.
    pub active_workers: usize,
    /// Events taken from the queue and not yet finished.
    pub in_flight: usize,
    /// Events accepted by the endpoint.
    pub delivered: usize,
    /// Events dropped after every attempt failed, or that could not be
    /// encoded.
    pub exhausted: usize,
    /// Events dropped because their class is excluded.
    pub excluded: usize,
    /// Events evicted from a full queue.
    pub discarded: usize,
}

/// Shared atomic counters behind [`PoolStats`].
#[derive(Debug, Default)]
pub struct PoolCounters {
    active_workers: AtomicUsize,
    in_flight: AtomicUsize,
    delivered: AtomicUsize,
    exhausted: AtomicUsize,
    excluded: AtomicUsize,
    discarded: AtomicUsize,
}

impl PoolCounters {
    /// Reads every counter.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            active_workers: self.active_workers.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            delivered: self.delivered.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn worker_spawned(&self) {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
    }

    /// Zeroes the gauges after worker tasks were aborted mid-flight.
    pub(crate) fn workers_aborted(&self) {
        self.active_workers.store(0, Ordering::Release);
        self.in_flight.store(0, Ordering::Release);
    }

    /// Counts one event evicted from a full queue.
    pub fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts the terminal state of one event.
    pub fn record(&self, status: &DeliveryStatus) {
        let counter = match status {
            DeliveryStatus::Delivered { .. } => &self.delivered,
            DeliveryStatus::Excluded => &self.excluded,
            DeliveryStatus::Exhausted { .. } | DeliveryStatus::Unencodable { .. } => {
                &self.exhausted
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A single delivery worker.
pub(crate) struct DeliveryWorker {
    id: usize,
    queue: Arc<DispatchQueue<ErrorEvent>>,
    dispatcher: Arc<Dispatcher>,
    counters: Arc<PoolCounters>,
    cancellation_token: CancellationToken,
    priority: WorkerPriority,
}

impl DeliveryWorker {
    pub(crate) fn new(
        id: usize,
        queue: Arc<DispatchQueue<ErrorEvent>>,
        dispatcher: Arc<Dispatcher>,
        counters: Arc<PoolCounters>,
        cancellation_token: CancellationToken,
        priority: WorkerPriority,
    ) -> Self {
        Self { id, queue, dispatcher, counters, cancellation_token, priority }
    }

    /// Processes events until the queue is closed and drained or the worker
    /// is cancelled.
    ///
    /// The pool counts the worker as active when it is spawned.
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, priority = ?self.priority, "delivery worker starting");

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => {
                    info!(worker_id = self.id, "delivery worker received shutdown signal");
                    break;
                },
                next = self.queue.pop() => match next {
                    Some(event) => event,
                    None => break,
                },
            };
            self.counters.in_flight.fetch_add(1, Ordering::AcqRel);

            if self.priority == WorkerPriority::Low {
                tokio::task::yield_now().await;
            }

            debug!(worker_id = self.id, event_id = %event.id(), "dispatching notice");
            let status = self.dispatcher.dispatch(&event).await;

            self.counters.record(&status);
            self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        }

        self.counters.active_workers.fetch_sub(1, Ordering::AcqRel);
        info!(worker_id = self.id, "delivery worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::DeliveryOutcome;

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("LOW".parse::<WorkerPriority>(), Ok(WorkerPriority::Low));
        assert_eq!(" normal ".parse::<WorkerPriority>(), Ok(WorkerPriority::Normal));
        assert!("max".parse::<WorkerPriority>().is_err());
        assert_eq!(WorkerPriority::default(), WorkerPriority::Low);
    }

    #[test]
    fn counters_track_terminal_states() {
        let counters = PoolCounters::default();

        counters.record(&DeliveryStatus::Delivered { attempts: 1 });
        counters.record(&DeliveryStatus::Excluded);
        counters.record(&DeliveryStatus::Exhausted {
            attempts: 3,
            last: DeliveryOutcome::Rejected(500),
        });
        counters.record(&DeliveryStatus::Unencodable { reason: "bad".to_string() });
        counters.record_discard();

        assert_eq!(counters.snapshot(), PoolStats {
            active_workers: 0,
            in_flight: 0,
            delivered: 1,
            exhausted: 2,
            excluded: 1,
            discarded: 1,
        });
    }
}
