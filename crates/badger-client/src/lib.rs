//! Error reporting facade for Rust services.
//!
//! A [`Notifier`] turns application errors into Honeybadger notices and
//! delivers them without blocking the reporting task. Configuration comes
//! from defaults, `badger.toml` and `HONEYBADGER_*` environment variables
//! (see [`NotifierConfig`]), or from `honeybadger.*` process properties.
//!
//! ```no_run
//! use badger_client::{Notifier, NotifierConfig};
//!
//! # async fn example() -> badger_client::Result<()> {
//! let notifier = Notifier::from_config(NotifierConfig::load()?)?;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
//! notifier.notify(&error).await;
//!
//! notifier.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod notifier;

pub use badger_core::{
    context, ErrorEvent, Exception, RequestInfoSource, RequestSnapshot, SnapshotRequestInfo,
    StackFrame, SystemProperties,
};
pub use badger_delivery::{DeliveryStatus, PoolStats, ShutdownReport, WorkerPriority};
pub use config::NotifierConfig;
pub use error::{NotifierError, Result};
pub use notifier::{Notifier, NotifierBuilder, ReportOutcome};
