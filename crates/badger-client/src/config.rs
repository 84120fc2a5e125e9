//! Notifier configuration.

use std::{num::NonZeroUsize, time::Duration};

use badger_core::{
    exclusions::{
        API_KEY_PROPERTY, ENDPOINT_PROPERTY, EXCLUDED_CLASSES_PROPERTY,
        EXCLUDED_PROPERTIES_PROPERTY,
    },
    ExclusionSets, Settings, SystemProperties,
};
use badger_delivery::{
    ClientConfig, PoolConfig, WorkerPriority, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_WORKER_COUNT,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map, Value},
    Figment, Metadata, Profile, Provider,
};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{NotifierError, Result};

const CONFIG_FILE: &str = "badger.toml";

const ENV_PREFIX: &str = "HONEYBADGER_";

/// Complete notifier configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `HONEYBADGER_` (highest priority)
/// 2. Configuration file (`badger.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// [`NotifierConfig::from_properties`] reads the `honeybadger.*` process
/// properties instead of the file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Project API key.
    ///
    /// Environment variable: `HONEYBADGER_API_KEY`
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_key: Option<String>,
    /// Notices endpoint URL.
    ///
    /// Environment variable: `HONEYBADGER_ENDPOINT`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Comma-delimited process properties never sent.
    ///
    /// Environment variable: `HONEYBADGER_EXCLUDED_SYS_PROPS`
    #[serde(default, deserialize_with = "lenient_string")]
    pub excluded_sys_props: Option<String>,
    /// Comma-delimited exception classes never reported.
    ///
    /// Environment variable: `HONEYBADGER_EXCLUDED_EXCEPTION_CLASSES`
    #[serde(default, deserialize_with = "lenient_string")]
    pub excluded_exception_classes: Option<String>,
    /// Deliver from background workers instead of the caller's task.
    ///
    /// Environment variable: `HONEYBADGER_ASYNC_DISPATCH`
    #[serde(default = "default_async_dispatch")]
    pub async_dispatch: bool,
    /// Number of background workers.
    ///
    /// Environment variable: `HONEYBADGER_WORKER_COUNT`
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Worker scheduling priority, `low` or `normal`.
    ///
    /// Environment variable: `HONEYBADGER_WORKER_PRIORITY`
    #[serde(default)]
    pub worker_priority: WorkerPriority,
    /// Dispatch queue capacity; unset means unbounded.
    ///
    /// An unbounded queue never discards, so the discard-oldest policy only
    /// takes effect once a capacity is set.
    ///
    /// Environment variable: `HONEYBADGER_QUEUE_CAPACITY`
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// HTTP request timeout in milliseconds.
    ///
    /// Environment variable: `HONEYBADGER_REQUEST_TIMEOUT_MS`
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Shutdown grace period in milliseconds.
    ///
    /// Environment variable: `HONEYBADGER_SHUTDOWN_TIMEOUT_MS`
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl NotifierConfig {
    /// Loads configuration from defaults, `badger.toml` and `HONEYBADGER_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX));

        Self::extract(&figment)
    }

    /// Loads configuration from defaults overlaid with `honeybadger.*`
    /// process properties.
    ///
    /// Numeric properties that are not positive are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or is invalid.
    pub fn from_properties(properties: &SystemProperties) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(PropertiesProvider::new(properties));

        Self::extract(&figment)
    }

    fn extract(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::Configuration` naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;

        if self.worker_count == 0 {
            return Err(NotifierError::configuration("worker_count must be greater than 0"));
        }

        if self.queue_capacity == Some(0) {
            return Err(NotifierError::configuration(
                "queue_capacity must be greater than 0 when set",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(NotifierError::configuration("request_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Parsed endpoint.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::Configuration` for a malformed or non-HTTP URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            NotifierError::configuration(format!("endpoint '{}' is not a valid URL: {e}", self.endpoint))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(NotifierError::configuration(format!(
                "endpoint scheme must be http or https, got '{scheme}'"
            ))),
        }
    }

    /// Exclusion sets including the mandatory entries.
    pub fn exclusions(&self) -> ExclusionSets {
        ExclusionSets::from_lists(
            self.excluded_sys_props.as_deref(),
            self.excluded_exception_classes.as_deref(),
        )
    }

    /// Convert to worker pool configuration.
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            worker_count: self.worker_count,
            priority: self.worker_priority,
            queue_capacity: self.queue_capacity.and_then(NonZeroUsize::new),
        }
    }

    /// Convert to HTTP transport configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig { timeout: self.request_timeout(), ..ClientConfig::default() }
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            excluded_sys_props: None,
            excluded_exception_classes: None,
            async_dispatch: default_async_dispatch(),
            worker_count: default_worker_count(),
            worker_priority: WorkerPriority::default(),
            queue_capacity: None,
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_async_dispatch() -> bool {
    true
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

/// Environment values that look numeric or boolean reach serde typed, so
/// string settings accept any scalar and keep its text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Unsigned(number) => number.to_string(),
        Scalar::Signed(number) => number.to_string(),
        Scalar::Float(number) => number.to_string(),
        Scalar::Flag(flag) => flag.to_string(),
    }))
}

#[derive(Debug, Clone, Copy)]
enum PropertyKind {
    Text,
    Keyword,
    Flag,
    Positive,
}

/// Property key, config field and how the raw string is interpreted.
const PROPERTY_FIELDS: [(&str, &str, PropertyKind); 10] = [
    (API_KEY_PROPERTY, "api_key", PropertyKind::Text),
    (ENDPOINT_PROPERTY, "endpoint", PropertyKind::Text),
    (EXCLUDED_PROPERTIES_PROPERTY, "excluded_sys_props", PropertyKind::Text),
    (EXCLUDED_CLASSES_PROPERTY, "excluded_exception_classes", PropertyKind::Text),
    ("honeybadger.async", "async_dispatch", PropertyKind::Flag),
    ("honeybadger.max_threads", "worker_count", PropertyKind::Positive),
    ("honeybadger.priority", "worker_priority", PropertyKind::Keyword),
    ("honeybadger.queue_size", "queue_capacity", PropertyKind::Positive),
    ("honeybadger.timeout_ms", "request_timeout_ms", PropertyKind::Positive),
    ("honeybadger.shutdown_timeout_ms", "shutdown_timeout_ms", PropertyKind::Positive),
];

/// Figment provider over `honeybadger.*` process properties.
struct PropertiesProvider {
    dict: Dict,
}

impl PropertiesProvider {
    fn new(properties: &SystemProperties) -> Self {
        let mut dict = Dict::new();
        for (key, field, kind) in PROPERTY_FIELDS {
            let Some(raw) = properties.get(key) else { continue };
            match property_value(&raw, kind) {
                Some(value) => {
                    dict.insert(field.to_string(), value);
                },
                None => debug!(property = key, value = %raw, "ignoring non-positive property"),
            }
        }
        Self { dict }
    }
}

fn property_value(raw: &str, kind: PropertyKind) -> Option<Value> {
    let trimmed = raw.trim();
    match kind {
        PropertyKind::Text => Some(Value::from(raw.to_string())),
        PropertyKind::Keyword => Some(Value::from(trimmed.to_ascii_lowercase())),
        PropertyKind::Flag => Some(Value::from(trimmed.eq_ignore_ascii_case("true"))),
        PropertyKind::Positive => match trimmed.parse::<i64>() {
            Ok(number) if number > 0 => Some(Value::from(number)),
            Ok(_) => None,
            Err(_) => Some(Value::from(raw.to_string())),
        },
    }
}

impl Provider for PropertiesProvider {
    fn metadata(&self) -> Metadata {
        Metadata::named("process properties")
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        Ok(Profile::Default.collect(self.dict.clone()))
    }
}
