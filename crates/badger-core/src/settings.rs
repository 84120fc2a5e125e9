//! Key lookup over process-level settings and environment variables.
//!
//! Process-level settings ("system properties") are an immutable, ordered
//! map owned by the application: runtime facts captured at startup plus
//! whatever keys the application adds. Environment variables are a
//! separate source behind the same [`Settings`] trait so that resolution
//! order can be tested without touching the real process environment.

use std::collections::{BTreeMap, HashMap};

/// A read-only key lookup.
pub trait Settings: Send + Sync {
    /// Value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Settings for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<S: std::hash::BuildHasher + Send + Sync> Settings for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl Settings for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Immutable process-level settings, reported under
/// `server.system_properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemProperties {
    entries: BTreeMap<String, String>,
}

impl SystemProperties {
    /// Creates an empty set of properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures runtime facts about the current process.
    ///
    /// Keys: `os.name`, `os.arch`, `os.family`, `process.id`, and when
    /// available `user.dir` and `exe.path`.
    pub fn runtime() -> Self {
        let mut properties = Self::new()
            .with("os.name", std::env::consts::OS)
            .with("os.arch", std::env::consts::ARCH)
            .with("os.family", std::env::consts::FAMILY)
            .with("process.id", std::process::id().to_string());

        if let Ok(dir) = std::env::current_dir() {
            properties = properties.with("user.dir", dir.display().to_string());
        }
        if let Ok(exe) = std::env::current_exe() {
            properties = properties.with("exe.path", exe.display().to_string());
        }
        properties
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Settings for SystemProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SystemProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
