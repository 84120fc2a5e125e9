//! Wire format of a notice.
//!
//! Field names follow the Honeybadger notices API. Optional fields are
//! omitted rather than sent as `null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete notice as sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Identifies the reporting library.
    pub notifier: NotifierInfo,
    /// The error itself.
    pub error: ErrorSection,
    /// Context, component and action, plus framework request fields.
    pub request: RequestSection,
    /// Environment and host the error occurred on.
    pub server: ServerSection,
}

/// Static name and version of the reporting library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierInfo {
    /// Library name.
    pub name: String,
    /// Library version.
    pub version: String,
}

/// The `error` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSection {
    /// Fully qualified class name of the root exception.
    pub class: String,
    /// Message override or the root exception's own message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Root frames, then a truncated excerpt of the direct cause.
    pub backtrace: Vec<BacktraceEntry>,
    /// Rendered trace keyed by 1-based line number.
    pub source: BTreeMap<String, String>,
}

/// One backtrace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceEntry {
    /// Source line, only present when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Source file, or marker text for synthetic entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// `Type.method`, or `.` for synthetic entries.
    pub method: String,
}

/// The `request` section.
///
/// `fields` carries whatever a request-info source supplied; the named
/// fields always win over entries with the same key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSection {
    /// Framework-supplied fields such as `url`, `params` and `session`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Diagnostic context captured with the event.
    pub context: BTreeMap<String, String>,
    /// Reporter label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Method of the root exception's innermost frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// The `server` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Deployment environment.
    pub environment_name: String,
    /// Reporting host.
    pub hostname: String,
    /// Working directory of the process.
    pub runtime_root: String,
    /// Process-level settings minus excluded keys.
    pub system_properties: BTreeMap<String, String>,
}
