//! Error types for notice delivery.
//!
//! None of these reach the caller of `report`: transport failures are
//! retried and logged, configuration failures surface only while a
//! notifier is being built. The type itself is on the mandatory exclusion
//! list so the pipeline never reports its own failures.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failures inside the delivery pipeline.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured request timeout in milliseconds
        timeout_ms: u64,
    },

    /// Invalid transport or pool configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// The dispatch queue no longer accepts tasks.
    #[error("dispatch queue is closed")]
    QueueClosed,

    /// A worker task panicked or was aborted; logged during shutdown.
    #[error("worker {worker_id} terminated abnormally: {message}")]
    WorkerPanic {
        /// Index of the failed worker
        worker_id: usize,
        /// Join error description
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates a worker failure error.
    pub fn worker_panic(worker_id: usize, message: impl Into<String>) -> Self {
        Self::WorkerPanic { worker_id, message: message.into() }
    }
}
