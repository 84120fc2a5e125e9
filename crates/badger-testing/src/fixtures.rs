//! Builders for exceptions, events and server facts with sensible defaults.

use std::sync::Arc;

use badger_core::{
    ErrorEvent, Exception, ExclusionSets, Serializer, ServerInfo, StackFrame, SystemProperties,
};
use badger_delivery::{DeliveryTarget, Dispatcher, Transport};

/// Builder for test exception chains.
#[derive(Debug, Clone)]
pub struct ExceptionBuilder {
    class_name: String,
    message: Option<String>,
    frame_count: u32,
    cause: Option<Exception>,
}

impl ExceptionBuilder {
    /// Starts a chain rooted at `class_name`.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), message: None, frame_count: 0, cause: None }
    }

    /// Sets the root message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Gives the root `count` synthetic frames with positive line numbers.
    #[must_use]
    pub fn frames(mut self, count: u32) -> Self {
        self.frame_count = count;
        self
    }

    /// Sets the direct cause.
    #[must_use]
    pub fn cause(mut self, cause: Exception) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Builds the exception.
    pub fn build(self) -> Exception {
        let mut exception =
            Exception::new(&self.class_name).with_frames(synthetic_frames(&self.class_name, self.frame_count));
        if let Some(message) = self.message {
            exception = exception.with_message(message);
        }
        if let Some(cause) = self.cause {
            exception = exception.caused_by(cause);
        }
        exception
    }

    /// Builds an event around the exception.
    pub fn event(self) -> ErrorEvent {
        ErrorEvent::new(self.build())
    }
}

/// `count` frames `<module>.step_<n>` at `src/lib.rs:<n * 10>`.
pub fn synthetic_frames(class_name: &str, count: u32) -> Vec<StackFrame> {
    let module = class_name.rsplit_once("::").map_or(class_name, |(module, _)| module);
    (1..=count)
        .map(|n| StackFrame::new(module, format!("step_{n}")).at("src/lib.rs", n * 10))
        .collect()
}

/// Plain event of class `app::Error` with message `boom` and two frames.
pub fn sample_event() -> ErrorEvent {
    ExceptionBuilder::new("app::Error").message("boom").frames(2).event()
}

/// Fixed server facts for deterministic payloads.
pub fn server_info() -> ServerInfo {
    ServerInfo {
        environment_name: "test".to_string(),
        hostname: "test-host".to_string(),
        runtime_root: "/srv/app".to_string(),
        system_properties: SystemProperties::new()
            .with("os.name", "linux")
            .with("honeybadger.api_key", "must-not-leak"),
    }
}

/// Dispatcher over `transport` with the given exclusions and test server
/// facts.
///
/// # Panics
///
/// Panics if `endpoint` is not a valid URL.
pub fn dispatcher(
    transport: Arc<dyn Transport>,
    exclusions: ExclusionSets,
    endpoint: &str,
) -> Dispatcher {
    Dispatcher::new(
        Serializer::new(Arc::new(exclusions), Arc::new(server_info())),
        transport,
        DeliveryTarget {
            endpoint: endpoint.parse().expect("test endpoint is a valid URL"),
            api_key: Some("test-api-key".to_string()),
        },
    )
}
