//! Error events and the Honeybadger notice format.
//!
//! Defines the event model handed to the notifier, the process-level
//! settings and exclusion lists consulted while reporting, and the pure
//! conversion from an [`ErrorEvent`] to the JSON [`Payload`] sent to the
//! notices endpoint. Nothing in this crate performs network I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod environment;
pub mod event;
pub mod exception;
pub mod exclusions;
pub mod payload;
pub mod serializer;
pub mod settings;

pub use environment::ServerInfo;
pub use event::{ErrorEvent, RequestSnapshot};
pub use exception::{Exception, StackFrame};
pub use exclusions::ExclusionSets;
pub use payload::{BacktraceEntry, Payload};
pub use serializer::{
    serialize, RequestInfoSource, Serializer, SnapshotRequestInfo, NOTIFIER_NAME,
    NOTIFIER_VERSION,
};
pub use settings::{ProcessEnv, Settings, SystemProperties};
