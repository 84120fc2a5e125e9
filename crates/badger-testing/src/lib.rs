//! Test harness for badger integration and unit tests.
//!
//! Provides a recording transport, a wiremock-backed notices endpoint and
//! fixture builders so tests never touch the real network.

pub mod fixtures;
pub mod http;
pub mod transport;

pub use fixtures::{dispatcher, sample_event, server_info, ExceptionBuilder};
pub use http::NoticeServer;
pub use transport::{RecordingTransport, Reply};
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn,badger=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,badger=debug")),
        )
        .with_test_writer()
        .try_init();
}
