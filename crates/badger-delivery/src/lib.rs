//! Notice delivery engine.
//!
//! Takes [`ErrorEvent`](badger_core::ErrorEvent)s, serializes them and
//! posts them to the notices endpoint, either inline on the caller's task or
//! through a pool of background workers fed by a bounded dispatch queue.
//!
//! # Architecture
//!
//! 1. **Submit** - events are pushed onto a [`DispatchQueue`]; a full queue
//!    evicts its oldest entry instead of blocking the caller
//! 2. **Dispatch** - a worker pops an event, checks the excluded classes and
//!    serializes it
//! 3. **Deliver** - the notice is posted up to three times until the
//!    endpoint answers `201 Created`
//! 4. **Shutdown** - the [`ShutdownCoordinator`] closes the queue and waits
//!    a bounded grace period before abandoning what is left
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use badger_core::{ErrorEvent, Exception, ExclusionSets, Serializer, ServerInfo};
//! use badger_delivery::{
//!     DeliveryTarget, Dispatcher, HttpTransport, PoolConfig, ShutdownCoordinator, WorkerPool,
//! };
//!
//! # async fn example(server: ServerInfo) -> badger_delivery::Result<()> {
//! let serializer = Serializer::new(Arc::new(ExclusionSets::default()), Arc::new(server));
//! let target = DeliveryTarget {
//!     endpoint: badger_delivery::DEFAULT_ENDPOINT.parse().expect("valid URL"),
//!     api_key: Some("project-key".to_string()),
//! };
//! let dispatcher = Dispatcher::new(serializer, Arc::new(HttpTransport::with_defaults()?), target);
//!
//! let pool = WorkerPool::start(PoolConfig::default(), Arc::new(dispatcher))?;
//! pool.submit(ErrorEvent::new(Exception::new("app::Error")))?;
//!
//! ShutdownCoordinator::default().shutdown(&pool).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod retry;
pub mod shutdown;
pub mod worker;
pub mod worker_pool;

pub use client::{ClientConfig, DeliveryRequest, HttpTransport, Transport, TransportResponse};
pub use dispatch::Dispatcher;
pub use error::{DeliveryError, Result};
pub use queue::{Admission, DispatchQueue};
pub use retry::{DeliveryOutcome, DeliveryStatus, DeliveryTarget, RetryPolicy};
pub use shutdown::{wait_for_shutdown_signal, ShutdownCoordinator, ShutdownReport};
pub use worker::{PoolStats, WorkerPriority};
pub use worker_pool::{PoolConfig, WorkerPool};

/// Default notices endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.honeybadger.io/v1/notices";

/// Default number of delivery attempts per notice.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Default HTTP request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default shutdown grace period in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;
