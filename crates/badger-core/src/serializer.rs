//! ErrorEvent to notice conversion.
//!
//! Serialization is pure and total: it performs no I/O, reads no
//! thread-local state and has no failure path. Missing data in an
//! exception (no message, no frames, unknown file or line) leaves the
//! corresponding field out instead of aborting.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    environment::ServerInfo,
    event::ErrorEvent,
    exception::{Exception, StackFrame},
    exclusions::ExclusionSets,
    payload::{BacktraceEntry, ErrorSection, NotifierInfo, Payload, RequestSection, ServerSection},
};

/// Name reported in `notifier.name`.
pub const NOTIFIER_NAME: &str = "badger-rust";

/// Version reported in `notifier.version`.
pub const NOTIFIER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Frames of the direct cause copied into the backtrace.
pub const MAX_CAUSE_FRAMES: usize = 3;

const CAUSE_FILE_INDENT: &str = "  ";
const MARKER_METHOD: &str = ".";
const RESERVED_REQUEST_KEYS: [&str; 3] = ["context", "component", "action"];

/// Optional capability contributing framework request fields.
///
/// Resolved once when the notifier is built. Implementations must not fail;
/// return an empty map when nothing is known.
pub trait RequestInfoSource: Send + Sync {
    /// Fields merged under `request`.
    fn request_fields(&self, event: &ErrorEvent) -> Map<String, Value>;
}

/// Renders the [`RequestSnapshot`](crate::RequestSnapshot) attached to an
/// event as `url`, `params`, `session` and `cgi_data`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotRequestInfo;

impl RequestInfoSource for SnapshotRequestInfo {
    fn request_fields(&self, event: &ErrorEvent) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(request) = event.request() {
            fields.insert("url".to_string(), Value::from(request.url.clone()));
            fields.insert("params".to_string(), string_map(&request.params));
            fields.insert("session".to_string(), string_map(&request.session));
            fields.insert("cgi_data".to_string(), string_map(&request.cgi_data));
        }
        fields
    }
}

fn string_map(entries: &BTreeMap<String, String>) -> Value {
    Value::Object(entries.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect())
}

/// Builds a notice from an event.
pub fn serialize(
    event: &ErrorEvent,
    exclusions: &ExclusionSets,
    server: &ServerInfo,
    request_source: Option<&dyn RequestInfoSource>,
) -> Payload {
    Payload {
        notifier: NotifierInfo {
            name: NOTIFIER_NAME.to_string(),
            version: NOTIFIER_VERSION.to_string(),
        },
        error: error_section(event),
        request: request_section(event, request_source),
        server: server_section(server, exclusions),
    }
}

fn error_section(event: &ErrorEvent) -> ErrorSection {
    let exception = event.exception();
    let message = event.message().or_else(|| exception.message()).map(str::to_string);
    let source = exception
        .render()
        .lines()
        .enumerate()
        .map(|(index, line)| ((index + 1).to_string(), line.to_string()))
        .collect();

    ErrorSection {
        class: exception.class_name().to_string(),
        message,
        backtrace: backtrace(exception),
        source,
    }
}

/// Root frames, then at most one marker, [`MAX_CAUSE_FRAMES`] cause frames
/// and one elision entry for the direct cause. Deeper causes are left to
/// `error.source`.
///
/// The marker always reads `Caused by: <class>: <message>`; a cause without
/// a message leaves the message part empty.
pub fn backtrace(exception: &Exception) -> Vec<BacktraceEntry> {
    let mut entries: Vec<BacktraceEntry> =
        exception.frames().iter().map(|frame| frame_entry(frame, "")).collect();

    if let Some(cause) = exception.cause() {
        entries.push(marker_entry(format!(
            "Caused by: {}: {}",
            cause.class_name(),
            cause.message().unwrap_or_default()
        )));

        let frames = cause.frames();
        entries.extend(
            frames.iter().take(MAX_CAUSE_FRAMES).map(|frame| frame_entry(frame, CAUSE_FILE_INDENT)),
        );
        if frames.len() > MAX_CAUSE_FRAMES {
            entries.push(marker_entry(format!("... {} more", frames.len() - MAX_CAUSE_FRAMES)));
        }
    }

    entries
}

fn frame_entry(frame: &StackFrame, indent: &str) -> BacktraceEntry {
    BacktraceEntry {
        number: (frame.line > 0).then_some(frame.line),
        file: frame.file.as_deref().map(|file| format!("{indent}{file}")),
        method: frame.qualified_method(),
    }
}

fn marker_entry(text: String) -> BacktraceEntry {
    BacktraceEntry { number: None, file: Some(text), method: MARKER_METHOD.to_string() }
}

fn request_section(
    event: &ErrorEvent,
    request_source: Option<&dyn RequestInfoSource>,
) -> RequestSection {
    let mut fields = request_source.map(|source| source.request_fields(event)).unwrap_or_default();
    for key in RESERVED_REQUEST_KEYS {
        fields.remove(key);
    }

    RequestSection {
        fields,
        context: event.context().clone(),
        component: event.component().map(str::to_string),
        action: event.exception().frames().first().map(|frame| frame.method.clone()),
    }
}

fn server_section(server: &ServerInfo, exclusions: &ExclusionSets) -> ServerSection {
    ServerSection {
        environment_name: server.environment_name.clone(),
        hostname: server.hostname.clone(),
        runtime_root: server.runtime_root.clone(),
        system_properties: server
            .system_properties
            .iter()
            .filter(|(key, _)| !exclusions.is_excluded_property(key))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

/// [`serialize`] bound to the immutable state of one notifier.
#[derive(Clone)]
pub struct Serializer {
    exclusions: Arc<ExclusionSets>,
    server: Arc<ServerInfo>,
    request_source: Option<Arc<dyn RequestInfoSource>>,
}

impl Serializer {
    /// Creates a serializer without a request-info source.
    pub fn new(exclusions: Arc<ExclusionSets>, server: Arc<ServerInfo>) -> Self {
        Self { exclusions, server, request_source: None }
    }

    /// Installs the request-info capability.
    #[must_use]
    pub fn with_request_source(mut self, source: Option<Arc<dyn RequestInfoSource>>) -> Self {
        self.request_source = source;
        self
    }

    /// Builds a notice from an event.
    pub fn serialize(&self, event: &ErrorEvent) -> Payload {
        serialize(event, &self.exclusions, &self.server, self.request_source.as_deref())
    }

    /// Exclusion sets applied by this serializer.
    pub fn exclusions(&self) -> &ExclusionSets {
        &self.exclusions
    }

    /// Server facts stamped on every notice.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("exclusions", &self.exclusions)
            .field("server", &self.server)
            .field("request_source", &self.request_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{event::RequestSnapshot, settings::SystemProperties};

    fn server() -> ServerInfo {
        ServerInfo {
            environment_name: "test".to_string(),
            hostname: "web-01".to_string(),
            runtime_root: "/srv/app".to_string(),
            system_properties: SystemProperties::new()
                .with("os.name", "linux")
                .with("honeybadger.api_key", "secret")
                .with("db.password", "hunter2"),
        }
    }

    fn frames(prefix: &str, count: u32) -> Vec<StackFrame> {
        (1..=count)
            .map(|i| StackFrame::new(format!("{prefix}::Type"), format!("f{i}")).at("lib.rs", i))
            .collect()
    }

    #[test]
    fn stamps_notifier_constants() {
        let event = ErrorEvent::new(Exception::new("app::Error"));
        let payload = serialize(&event, &ExclusionSets::default(), &server(), None);

        assert_eq!(payload.notifier.name, NOTIFIER_NAME);
        assert_eq!(payload.notifier.version, NOTIFIER_VERSION);
    }

    #[test]
    fn message_override_wins_over_exception_message() {
        let exception = Exception::new("app::Error").with_message("original");

        let plain = ErrorEvent::new(exception.clone());
        let overridden = ErrorEvent::new(exception).with_message("override");

        let exclusions = ExclusionSets::default();
        assert_eq!(
            serialize(&plain, &exclusions, &server(), None).error.message.as_deref(),
            Some("original")
        );
        assert_eq!(
            serialize(&overridden, &exclusions, &server(), None).error.message.as_deref(),
            Some("override")
        );
    }

    #[test]
    fn frame_number_only_emitted_for_positive_lines() {
        let exception = Exception::new("app::Error")
            .with_frame(StackFrame::new("app::Handler", "run").at("handler.rs", 7))
            .with_frame(StackFrame::new("app::Handler", "unknown"));

        let entries = backtrace(&exception);

        assert_eq!(entries[0].number, Some(7));
        assert_eq!(entries[0].file.as_deref(), Some("handler.rs"));
        assert_eq!(entries[0].method, "app::Handler.run");
        assert_eq!(entries[1].number, None);
        assert_eq!(entries[1].file, None);
    }

    #[test]
    fn cause_is_truncated_to_three_frames_with_elision() {
        let exception = Exception::new("app::Outer")
            .with_frames(frames("outer", 2))
            .caused_by(Exception::new("app::Inner").with_message("disk full").with_frames(frames("inner", 7)));

        let entries = backtrace(&exception);

        assert_eq!(entries.len(), 2 + 1 + 3 + 1);
        assert_eq!(entries[2].file.as_deref(), Some("Caused by: app::Inner: disk full"));
        assert_eq!(entries[2].method, ".");
        assert_eq!(entries[3].file.as_deref(), Some("  lib.rs"));
        assert_eq!(entries[5].method, "inner::Type.f3");
        assert_eq!(entries[6].file.as_deref(), Some("... 4 more"));
    }

    #[test]
    fn short_cause_has_no_elision_marker() {
        let exception =
            Exception::new("app::Outer").caused_by(Exception::new("app::Inner").with_frames(frames("inner", 3)));

        let entries = backtrace(&exception);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].file.as_deref(), Some("Caused by: app::Inner: "));
        assert!(entries.iter().all(|entry| !entry.file.as_deref().unwrap_or("").starts_with("...")));
    }

    #[test]
    fn nested_causes_are_not_recursed_into() {
        let exception = Exception::new("A").caused_by(
            Exception::new("B").with_frames(frames("b", 1)).caused_by(Exception::new("C").with_frames(frames("c", 5))),
        );

        let entries = backtrace(&exception);

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| !entry.method.starts_with("c::")));
    }

    #[test]
    fn source_is_keyed_by_line_number() {
        let exception = Exception::new("app::Error")
            .with_message("boom")
            .with_frames(frames("app", 2))
            .caused_by(Exception::new("io::Error"));
        let event = ErrorEvent::new(exception);

        let payload = serialize(&event, &ExclusionSets::default(), &server(), None);

        assert_eq!(payload.error.source.len(), 4);
        assert_eq!(payload.error.source["1"], "app::Error: boom");
        assert_eq!(payload.error.source["2"], "\tat app::Type.f1(lib.rs:1)");
        assert_eq!(payload.error.source["4"], "Caused by: io::Error");
    }

    #[test]
    fn request_overlays_context_component_and_action() {
        struct Hostile;
        impl RequestInfoSource for Hostile {
            fn request_fields(&self, _event: &ErrorEvent) -> Map<String, Value> {
                let mut fields = Map::new();
                fields.insert("url".to_string(), json!("https://example.com/orders"));
                fields.insert("component".to_string(), json!("spoofed"));
                fields.insert("context".to_string(), json!("spoofed"));
                fields
            }
        }

        let event = ErrorEvent::new(
            Exception::new("app::Error").with_frame(StackFrame::new("app::Orders", "create")),
        )
        .with_component("orders")
        .with_context("order_id", "17");

        let payload = serialize(&event, &ExclusionSets::default(), &server(), Some(&Hostile));
        let request = serde_json::to_value(&payload.request).expect("request serializes");

        assert_eq!(request["url"], "https://example.com/orders");
        assert_eq!(request["component"], "orders");
        assert_eq!(request["context"], json!({"order_id": "17"}));
        assert_eq!(request["action"], "create");
    }

    #[test]
    fn absent_capability_and_frames_leave_request_minimal() {
        let event = ErrorEvent::new(Exception::new("app::Error"));

        let payload = serialize(&event, &ExclusionSets::default(), &server(), None);
        let request = serde_json::to_value(&payload.request).expect("request serializes");

        assert_eq!(request, json!({"context": event.context()}));
    }

    #[test]
    fn snapshot_source_renders_request_details() {
        let mut snapshot = RequestSnapshot::new("https://example.com/checkout");
        snapshot.params.insert("cart".to_string(), "3".to_string());
        let event = ErrorEvent::new(Exception::new("app::Error")).with_request(snapshot);

        let fields = SnapshotRequestInfo.request_fields(&event);

        assert_eq!(fields["url"], "https://example.com/checkout");
        assert_eq!(fields["params"], json!({"cart": "3"}));
        assert_eq!(fields["session"], json!({}));
    }

    #[test]
    fn excluded_properties_are_filtered() {
        let exclusions = ExclusionSets::from_lists(Some("db.password"), None);
        let event = ErrorEvent::new(Exception::new("app::Error"));

        let payload = serialize(&event, &exclusions, &server(), None);

        assert_eq!(
            payload.server.system_properties,
            BTreeMap::from([("os.name".to_string(), "linux".to_string())])
        );
        assert_eq!(payload.server.environment_name, "test");
        assert_eq!(payload.server.hostname, "web-01");
    }
}
