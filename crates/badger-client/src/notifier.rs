//! The reporting facade applications hold on to.

use std::{
    error::Error,
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use badger_core::{
    ErrorEvent, ExclusionSets, ProcessEnv, RequestInfoSource, Serializer, ServerInfo, Settings,
    SystemProperties,
};
use badger_delivery::{
    wait_for_shutdown_signal, DeliveryStatus, DeliveryTarget, Dispatcher, HttpTransport,
    PoolConfig, PoolStats, RetryPolicy, ShutdownCoordinator, ShutdownReport, Transport,
    WorkerPool, WorkerPriority,
};
use tokio::{sync::OnceCell, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{config::NotifierConfig, error::Result};

/// What happened to a reported event from the caller's point of view.
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// Handed to the background workers.
    Queued,
    /// Not accepted because the notifier is shut down.
    Dropped,
    /// Delivered inline; carries the terminal status.
    Completed(DeliveryStatus),
}

impl ReportOutcome {
    /// Whether the event was queued or delivered inline, regardless of the
    /// delivery result.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

/// Accepts error events and delivers them to the notices endpoint.
///
/// In async mode (the default) events are queued for a worker pool that is
/// started on the first report; `report` never waits on the network. In
/// sync mode the caller's task performs the delivery.
pub struct Notifier {
    config: NotifierConfig,
    dispatcher: Arc<Dispatcher>,
    pool_config: PoolConfig,
    pool: OnceLock<Option<WorkerPool>>,
    closed: AtomicBool,
    coordinator: ShutdownCoordinator,
    shutdown_report: OnceCell<ShutdownReport>,
}

impl Notifier {
    /// Starts a builder with default configuration.
    pub fn builder() -> NotifierBuilder {
        NotifierBuilder::default()
    }

    /// Builds a notifier from `config` with the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or when the HTTP
    /// client cannot be built.
    pub fn from_config(config: NotifierConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Reports an event.
    ///
    /// Delivery failures are logged and never returned.
    pub async fn report(&self, event: ErrorEvent) -> ReportOutcome {
        if !self.config.async_dispatch {
            return ReportOutcome::Completed(self.dispatcher.dispatch(&event).await);
        }

        if self.closed.load(Ordering::Acquire) {
            debug!(event_id = %event.id(), "notifier is shut down, notice dropped");
            return ReportOutcome::Dropped;
        }

        match self.pool() {
            Some(pool) => match pool.submit(event) {
                Ok(()) => ReportOutcome::Queued,
                Err(_) => ReportOutcome::Dropped,
            },
            None if self.closed.load(Ordering::Acquire) => {
                debug!(event_id = %event.id(), "notifier is shut down, notice dropped");
                ReportOutcome::Dropped
            },
            None => ReportOutcome::Completed(self.dispatcher.dispatch(&event).await),
        }
    }

    /// Captures `error` with its source chain and reports it.
    ///
    /// The error is captured before this returns, so the future does not
    /// borrow it.
    pub fn notify<E: Error + 'static>(&self, error: &E) -> impl Future<Output = ReportOutcome> + '_ {
        self.report(ErrorEvent::from_error(error))
    }

    /// Like [`notify`](Self::notify) for type-erased errors such as
    /// `Box<dyn Error + Send + Sync>`.
    pub fn notify_dyn(&self, error: &(dyn Error + 'static)) -> impl Future<Output = ReportOutcome> + '_ {
        self.report(ErrorEvent::from_dyn_error(error))
    }

    /// Stops the worker pool, waiting up to the shutdown grace period.
    ///
    /// Later asynchronous reports are dropped. Only the first call stops the
    /// pool; concurrent and later callers wait for it and get its report.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.closed.store(true, Ordering::Release);

        *self
            .shutdown_report
            .get_or_init(|| async {
                match self.pool.get_or_init(|| None) {
                    Some(pool) => self.coordinator.shutdown(pool).await,
                    None => {
                        debug!("notifier shut down before any worker started");
                        ShutdownReport {
                            graceful: true,
                            abandoned: 0,
                            failed_workers: 0,
                            elapsed: Duration::ZERO,
                        }
                    },
                }
            })
            .await
    }

    /// Spawns a task that shuts the notifier down on SIGINT, SIGTERM or
    /// Ctrl-C.
    ///
    /// The task yields `None` if signal handlers could not be installed.
    pub fn shutdown_on_signal(self: &Arc<Self>) -> JoinHandle<Option<ShutdownReport>> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    info!("shutdown signal received, stopping notifier");
                    Some(notifier.shutdown().await)
                },
                Err(e) => {
                    error!(error = %e, "failed to install shutdown signal handlers");
                    None
                },
            }
        })
    }

    /// Exclusion sets in effect.
    pub fn exclusions(&self) -> &ExclusionSets {
        self.dispatcher.serializer().exclusions()
    }

    /// Server facts resolved at construction.
    pub fn server_info(&self) -> &ServerInfo {
        self.dispatcher.serializer().server()
    }

    /// Worker pool counters; all zero until the pool starts.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.get().and_then(Option::as_ref).map(WorkerPool::stats).unwrap_or_default()
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Configuration the notifier was built with.
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    fn pool(&self) -> Option<&WorkerPool> {
        self.pool
            .get_or_init(|| match WorkerPool::start(self.pool_config, self.dispatcher.clone()) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    error!(error = %e, "failed to start delivery workers, reporting inline");
                    None
                },
            })
            .as_ref()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("endpoint", &self.config.endpoint)
            .field("async_dispatch", &self.config.async_dispatch)
            .field("pool_started", &self.pool.get().is_some_and(Option::is_some))
            .field("closed", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Notifier`].
#[derive(Default)]
pub struct NotifierBuilder {
    config: NotifierConfig,
    transport: Option<Arc<dyn Transport>>,
    request_info: Option<Arc<dyn RequestInfoSource>>,
    properties: Option<SystemProperties>,
    env: Option<Box<dyn Settings>>,
    retry_policy: RetryPolicy,
}

impl NotifierBuilder {
    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: NotifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the project API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Sets the notices endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Chooses background (`true`) or inline (`false`) delivery.
    #[must_use]
    pub fn async_dispatch(mut self, enabled: bool) -> Self {
        self.config.async_dispatch = enabled;
        self
    }

    /// Sets the number of background workers.
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Sets the worker scheduling priority.
    #[must_use]
    pub fn worker_priority(mut self, priority: WorkerPriority) -> Self {
        self.config.worker_priority = priority;
        self
    }

    /// Bounds the dispatch queue; the oldest event is discarded on overflow.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = duration_ms(timeout);
        self
    }

    /// Comma-delimited process properties never sent.
    #[must_use]
    pub fn excluded_sys_props(mut self, list: impl Into<String>) -> Self {
        self.config.excluded_sys_props = Some(list.into());
        self
    }

    /// Comma-delimited exception classes never reported.
    #[must_use]
    pub fn excluded_exception_classes(mut self, list: impl Into<String>) -> Self {
        self.config.excluded_exception_classes = Some(list.into());
        self
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Installs a source of framework request fields.
    #[must_use]
    pub fn request_info(mut self, source: Arc<dyn RequestInfoSource>) -> Self {
        self.request_info = Some(source);
        self
    }

    /// Process properties to report; defaults to
    /// [`SystemProperties::runtime`].
    #[must_use]
    pub fn properties(mut self, properties: SystemProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Environment lookup used for server facts; defaults to the process
    /// environment.
    #[must_use]
    pub fn env(mut self, env: impl Settings + 'static) -> Self {
        self.env = Some(Box::new(env));
        self
    }

    /// Overrides the attempt count and pause between attempts.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Validates the configuration and builds the notifier.
    ///
    /// No worker is started until the first asynchronous report.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or when the HTTP
    /// client cannot be built.
    pub fn build(self) -> Result<Notifier> {
        let config = self.config;
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let properties = self.properties.unwrap_or_else(SystemProperties::runtime);
        let server = match &self.env {
            Some(env) => ServerInfo::resolve(properties, &**env),
            None => ServerInfo::resolve(properties, &ProcessEnv),
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.to_client_config())?),
        };

        if config.api_key.is_none() {
            warn!("no API key configured, the notices endpoint will reject reports");
        }

        let serializer = Serializer::new(Arc::new(config.exclusions()), Arc::new(server))
            .with_request_source(self.request_info);
        let target = DeliveryTarget { endpoint, api_key: config.api_key.clone() };
        let dispatcher =
            Dispatcher::new(serializer, transport, target).with_policy(self.retry_policy);

        info!(
            endpoint = %config.endpoint,
            environment = %dispatcher.serializer().server().environment_name,
            async_dispatch = config.async_dispatch,
            worker_count = config.worker_count,
            "notifier configured"
        );

        Ok(Notifier {
            pool_config: config.to_pool_config(),
            coordinator: ShutdownCoordinator::new(config.shutdown_timeout()),
            config,
            dispatcher: Arc::new(dispatcher),
            pool: OnceLock::new(),
            closed: AtomicBool::new(false),
            shutdown_report: OnceCell::new(),
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use badger_core::Exception;
    use badger_delivery::{DeliveryError, DeliveryRequest, TransportResponse};

    use super::*;

    #[derive(Default)]
    struct Accepting;

    #[async_trait::async_trait]
    impl Transport for Accepting {
        async fn post(&self, _request: &DeliveryRequest) -> badger_delivery::Result<TransportResponse> {
            Ok(TransportResponse { status_code: 201, duration: Duration::ZERO })
        }
    }

    fn builder() -> NotifierBuilder {
        Notifier::builder()
            .api_key("key")
            .endpoint("http://localhost:9/v1/notices")
            .transport(Arc::new(Accepting))
            .properties(SystemProperties::new())
            .env(BTreeMap::<String, String>::new())
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = builder().worker_count(0).build();

        assert!(result.is_err());
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(builder().endpoint("::not-a-url").build().is_err());
    }

    #[test]
    fn builder_does_not_start_workers() {
        let notifier = builder().build().unwrap();

        assert_eq!(notifier.pool_stats(), PoolStats::default());
        assert!(notifier.pool.get().is_none());
    }

    #[test]
    fn environment_comes_from_injected_settings() {
        let env: BTreeMap<String, String> =
            [("ENV".to_string(), "staging".to_string())].into_iter().collect();

        let notifier = builder().env(env).build().unwrap();

        assert_eq!(notifier.server_info().environment_name, "staging");
    }

    #[tokio::test]
    async fn sync_mode_reports_inline() {
        let notifier = builder().async_dispatch(false).build().unwrap();

        let outcome = notifier.report(ErrorEvent::new(Exception::new("app::Error"))).await;

        assert!(matches!(outcome, ReportOutcome::Completed(DeliveryStatus::Delivered { attempts: 1 })));
        assert!(notifier.pool.get().is_none());
    }

    #[tokio::test]
    async fn internal_errors_are_never_reported() {
        let notifier = builder().async_dispatch(false).build().unwrap();

        let outcome = notifier.notify(&DeliveryError::QueueClosed).await;

        assert!(matches!(outcome, ReportOutcome::Completed(DeliveryStatus::Excluded)));
    }

    #[tokio::test]
    async fn shutdown_without_reports_is_graceful() {
        let notifier = builder().build().unwrap();

        let report = notifier.shutdown().await;

        assert!(report.graceful);
        assert_eq!(report.abandoned, 0);
        assert!(notifier.is_shut_down());
    }

    #[tokio::test]
    async fn reports_after_shutdown_are_dropped() {
        let notifier = builder().build().unwrap();
        notifier.shutdown().await;

        let outcome = notifier.report(ErrorEvent::new(Exception::new("app::Error"))).await;

        assert!(matches!(outcome, ReportOutcome::Dropped));
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn duration_conversion_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
