//! The unit of work flowing through the pipeline.

use std::{collections::BTreeMap, error::Error};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{context, exception::Exception};

/// One observed error plus the metadata captured when it was observed.
///
/// Built by the caller, then moved into the notifier. The pipeline reads it
/// once to build a payload and drops it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    id: Uuid,
    exception: Exception,
    message: Option<String>,
    component: Option<String>,
    context: BTreeMap<String, String>,
    request: Option<RequestSnapshot>,
}

impl ErrorEvent {
    /// Creates an event for `exception`, snapshotting the calling thread's
    /// diagnostic context.
    pub fn new(exception: Exception) -> Self {
        Self {
            id: Uuid::new_v4(),
            exception,
            message: None,
            component: None,
            context: context::snapshot(),
            request: None,
        }
    }

    /// Captures a live error (type name, source chain and call stack).
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        Self::new(Exception::capture(error))
    }

    /// Captures a type-erased error, e.g. one held in a `Box<dyn Error>`.
    pub fn from_dyn_error(error: &(dyn Error + 'static)) -> Self {
        Self::new(Exception::capture_dyn(error))
    }

    /// Overrides the message reported instead of the exception's own.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the reporter label, sent as `request.component`.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Adds a context entry on top of the captured thread context.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches request details recorded by a web framework integration.
    #[must_use]
    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = Some(request);
        self
    }

    /// Identifier used to correlate log lines for this event.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The root exception of the chain.
    pub fn exception(&self) -> &Exception {
        &self.exception
    }

    /// Class name checked against the excluded exception classes.
    pub fn class_name(&self) -> &str {
        self.exception.class_name()
    }

    /// Message override, if one was set.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Reporter label.
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Context captured at creation plus explicit additions.
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Request details, if a framework integration recorded them.
    pub fn request(&self) -> Option<&RequestSnapshot> {
        self.request.as_ref()
    }
}

/// Request details a web framework integration recorded for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Full request URL.
    pub url: String,
    /// Query and form parameters.
    pub params: BTreeMap<String, String>,
    /// Session values.
    pub session: BTreeMap<String, String>,
    /// Server and header variables (`REQUEST_METHOD`, `HTTP_USER_AGENT`, ...).
    pub cgi_data: BTreeMap<String, String>,
}

impl RequestSnapshot {
    /// Creates a snapshot for `url` with no parameters.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }
}
