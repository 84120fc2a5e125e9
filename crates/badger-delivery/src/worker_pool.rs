//! Fixed-size pool of delivery workers sharing one dispatch queue.
//!
//! The pool owns the queue, the workers' join handles and their
//! cancellation token. Submission never waits on the network; lifecycle
//! control (close, cancel, abort) is driven by the
//! [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator).

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
};

use badger_core::ErrorEvent;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    dispatch::Dispatcher,
    error::{DeliveryError, Result},
    queue::{Admission, DispatchQueue},
    worker::{DeliveryWorker, PoolCounters, PoolStats, WorkerPriority},
    DEFAULT_WORKER_COUNT,
};

/// Sizing and scheduling of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers, at least 1.
    pub worker_count: usize,
    /// Scheduling priority of every worker.
    pub priority: WorkerPriority,
    /// Queue capacity; `None` is unbounded and never discards.
    pub queue_capacity: Option<NonZeroUsize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            priority: WorkerPriority::default(),
            queue_capacity: None,
        }
    }
}

/// Running workers plus the queue they drain.
pub struct WorkerPool {
    config: PoolConfig,
    queue: Arc<DispatchQueue<ErrorEvent>>,
    counters: Arc<PoolCounters>,
    cancellation_token: CancellationToken,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `config.worker_count` workers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` for a zero worker count
    /// or when called outside a tokio runtime.
    pub fn start(config: PoolConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(DeliveryError::configuration("worker count must be at least 1"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            DeliveryError::configuration(format!("worker pool requires a tokio runtime: {e}"))
        })?;

        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));
        let counters = Arc::new(PoolCounters::default());
        let cancellation_token = CancellationToken::new();

        info!(
            worker_count = config.worker_count,
            priority = ?config.priority,
            queue_capacity = config.queue_capacity.map(NonZeroUsize::get),
            "spawning delivery workers"
        );

        let worker_handles = (0..config.worker_count)
            .map(|worker_id| {
                let worker = DeliveryWorker::new(
                    worker_id,
                    queue.clone(),
                    dispatcher.clone(),
                    counters.clone(),
                    cancellation_token.clone(),
                    config.priority,
                );
                counters.worker_spawned();
                runtime.spawn(worker.run())
            })
            .collect();

        Ok(Self {
            config,
            queue,
            counters,
            cancellation_token,
            worker_handles: Mutex::new(worker_handles),
        })
    }

    /// Enqueues an event without waiting.
    ///
    /// A full queue evicts its oldest event, which is counted and logged but
    /// not reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::QueueClosed` once the pool is shutting down.
    pub fn submit(&self, event: ErrorEvent) -> Result<()> {
        match self.queue.push(event) {
            Admission::Accepted => Ok(()),
            Admission::DisplacedOldest(oldest) => {
                self.counters.record_discard();
                debug!(event_id = %oldest.id(), "dispatch queue full, discarded oldest notice");
                Ok(())
            },
            Admission::Refused(event) => {
                debug!(event_id = %event.id(), "dispatch queue closed, notice dropped");
                Err(DeliveryError::QueueClosed)
            },
        }
    }

    /// Stops accepting submissions. Workers finish what is queued and exit.
    pub fn close(&self) {
        self.queue.close();
    }

    /// Whether submissions are refused.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Number of queued events.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Configuration the pool was started with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.worker_handles.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub(crate) fn drain(&self) -> Vec<ErrorEvent> {
        self.queue.drain()
    }

    pub(crate) fn counters(&self) -> &PoolCounters {
        &self.counters
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let handles = self.take_handles();
        let active_count = handles.iter().filter(|h| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_workers = active_count,
                queued = self.queue.len(),
                "worker pool dropped without shutdown, cancelling workers"
            );
            self.queue.close();
            self.cancellation_token.cancel();
        }
    }
}
