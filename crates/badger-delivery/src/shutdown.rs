//! Graceful shutdown with a bounded grace period.
//!
//! Shutdown closes the queue, waits for workers to finish what is queued
//! and in flight, and after the grace period cancels and aborts whatever is
//! left. Events that never completed are counted, not reported.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::{error::DeliveryError, worker_pool::WorkerPool, DEFAULT_SHUTDOWN_TIMEOUT_MS};

/// Result of a pool shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Whether every worker finished inside the grace period.
    pub graceful: bool,
    /// Events still queued or in flight when the grace period ran out.
    pub abandoned: usize,
    /// Workers that panicked or were aborted before shutdown joined them.
    pub failed_workers: usize,
    /// Time from the start of shutdown to its end.
    pub elapsed: Duration,
}

/// Drives a [`WorkerPool`] to a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownCoordinator {
    grace: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS))
    }
}

impl ShutdownCoordinator {
    /// Creates a coordinator with the given grace period.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Grace period granted to queued and in-flight events.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Stops `pool`.
    ///
    /// Safe to call more than once; later calls find no workers and report
    /// a graceful, empty shutdown.
    pub async fn shutdown(&self, pool: &WorkerPool) -> ShutdownReport {
        let started = Instant::now();
        pool.close();

        let handles = pool.take_handles();
        info!(
            workers = handles.len(),
            queued = pool.queued(),
            grace_ms = self.grace.as_millis(),
            "shutting down delivery workers"
        );

        let abort_handles: Vec<_> = handles.iter().map(|handle| handle.abort_handle()).collect();
        let mut failures = Vec::new();
        let join_all = async {
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    let failure = DeliveryError::worker_panic(worker_id, join_error.to_string());
                    error!(worker_id, error = %failure, "delivery worker terminated abnormally");
                    failures.push(failure);
                }
            }
        };
        let finished = tokio::time::timeout(self.grace, join_all).await.is_ok();
        let failed_workers = failures.len();

        if finished {
            let elapsed = started.elapsed();
            info!(
                elapsed_ms = elapsed.as_millis(),
                failed_workers,
                "delivery workers stopped gracefully"
            );
            return ShutdownReport { graceful: true, abandoned: 0, failed_workers, elapsed };
        }

        pool.cancel();
        let queued = pool.drain().len();
        let in_flight = pool.stats().in_flight;
        for handle in &abort_handles {
            handle.abort();
        }
        pool.counters().workers_aborted();

        let abandoned = queued + in_flight;
        let elapsed = started.elapsed();
        warn!(
            abandoned,
            queued,
            in_flight,
            grace_ms = self.grace.as_millis(),
            "shutdown grace period expired, abandoning undelivered notices"
        );

        ShutdownReport { graceful: false, abandoned, failed_workers, elapsed }
    }
}

/// Completes when the process receives a termination signal.
///
/// Unix: SIGINT, SIGTERM or SIGQUIT, with Ctrl-C as a fallback. Elsewhere
/// only Ctrl-C.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives Ctrl-C.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use badger_core::{ErrorEvent, Exception, ExclusionSets, Serializer, ServerInfo, SystemProperties};
    use reqwest::Url;

    use super::*;
    use crate::{
        client::{DeliveryRequest, Transport, TransportResponse},
        dispatch::Dispatcher,
        error::Result,
        retry::DeliveryTarget,
        worker_pool::PoolConfig,
    };

    struct Slow {
        delay: Duration,
    }

    #[async_trait]
    impl Transport for Slow {
        async fn post(&self, _request: &DeliveryRequest) -> Result<TransportResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(TransportResponse { status_code: 201, duration: self.delay })
        }
    }

    fn pool(delay: Duration) -> WorkerPool {
        pool_with(Arc::new(Slow { delay }))
    }

    fn pool_with(transport: Arc<dyn Transport>) -> WorkerPool {
        let server = ServerInfo {
            environment_name: "test".to_string(),
            hostname: "localhost".to_string(),
            runtime_root: "/".to_string(),
            system_properties: SystemProperties::new(),
        };
        let dispatcher = Dispatcher::new(
            Serializer::new(Arc::new(ExclusionSets::default()), Arc::new(server)),
            transport,
            DeliveryTarget {
                endpoint: Url::parse("http://localhost/v1/notices").unwrap(),
                api_key: None,
            },
        );
        WorkerPool::start(PoolConfig::default(), Arc::new(dispatcher)).unwrap()
    }

    struct Panicking;

    #[async_trait]
    impl Transport for Panicking {
        async fn post(&self, _request: &DeliveryRequest) -> Result<TransportResponse> {
            panic!("transport bug");
        }
    }

    fn event() -> ErrorEvent {
        ErrorEvent::new(Exception::new("app::Error"))
    }

    #[tokio::test]
    async fn idle_pool_shuts_down_gracefully() {
        let pool = pool(Duration::ZERO);

        let report = ShutdownCoordinator::new(Duration::from_secs(1)).shutdown(&pool).await;

        assert!(report.graceful);
        assert_eq!(report.abandoned, 0);
        assert_eq!(pool.stats().active_workers, 0);
    }

    #[tokio::test]
    async fn queued_work_finishes_within_grace() {
        let pool = pool(Duration::from_millis(10));
        for _ in 0..3 {
            pool.submit(event()).unwrap();
        }

        let report = ShutdownCoordinator::new(Duration::from_secs(5)).shutdown(&pool).await;

        assert!(report.graceful);
        assert_eq!(pool.stats().delivered, 3);
    }

    #[tokio::test]
    async fn expired_grace_abandons_remaining_work() {
        let pool = pool(Duration::from_secs(30));
        for _ in 0..3 {
            pool.submit(event()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = ShutdownCoordinator::new(Duration::from_millis(50)).shutdown(&pool).await;

        assert!(!report.graceful);
        assert_eq!(report.abandoned, 3);
        assert!(report.elapsed < Duration::from_secs(5));
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.stats().delivered, 0);
    }

    #[tokio::test]
    async fn panicked_worker_is_counted_as_failed() {
        let pool = pool_with(Arc::new(Panicking));
        pool.submit(event()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = ShutdownCoordinator::new(Duration::from_secs(1)).shutdown(&pool).await;

        assert!(report.graceful);
        assert_eq!(report.failed_workers, 1);
        assert_eq!(report.abandoned, 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let pool = pool(Duration::ZERO);
        let coordinator = ShutdownCoordinator::default();

        coordinator.shutdown(&pool).await;
        let second = coordinator.shutdown(&pool).await;

        assert!(second.graceful);
        assert_eq!(second.abandoned, 0);
        assert_eq!(second.failed_workers, 0);
        assert_eq!(coordinator.grace(), Duration::from_secs(10));
    }
}
