//! Server facts resolved once when a notifier is built.

use std::path::Path;

use tracing::error;

use crate::settings::{Settings, SystemProperties};

/// Environment name used when nothing else is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Reported when the hostname or runtime root cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// Static description of the reporting server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Deployment environment (`production`, `staging`, ...).
    pub environment_name: String,
    /// Host the process runs on.
    pub hostname: String,
    /// Canonical working directory of the process.
    pub runtime_root: String,
    /// Process-level settings, filtered at serialization time.
    pub system_properties: SystemProperties,
}

impl ServerInfo {
    /// Resolves every field from the given sources.
    pub fn resolve(properties: SystemProperties, env: &dyn Settings) -> Self {
        Self {
            environment_name: resolve_environment_name(&properties, env),
            hostname: resolve_hostname(env),
            runtime_root: resolve_runtime_root(),
            system_properties: properties,
        }
    }
}

/// Finds the environment name.
///
/// Checked in order, first non-empty value wins: property `JAVA_ENV`,
/// variable `JAVA_ENV`, property `ENV`, variable `ENV`. Falls back to
/// [`DEFAULT_ENVIRONMENT`].
///
/// Older notifiers never consulted the `ENV` variable because of a faulty
/// check, so its precedence here is a best reading rather than a port.
pub fn resolve_environment_name(properties: &dyn Settings, env: &dyn Settings) -> String {
    let candidates: [(&dyn Settings, &str); 4] =
        [(properties, "JAVA_ENV"), (env, "JAVA_ENV"), (properties, "ENV"), (env, "ENV")];

    candidates
        .into_iter()
        .find_map(|(source, key)| source.get(key).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// Hostname from `HOSTNAME`, then the kernel, then `/etc/hostname`.
pub fn resolve_hostname(env: &dyn Settings) -> String {
    if let Some(hostname) = env.get("HOSTNAME").filter(|name| !name.trim().is_empty()) {
        return hostname;
    }

    for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Some(hostname) = read_trimmed(Path::new(path)) {
            return hostname;
        }
    }

    error!("unable to determine hostname");
    UNKNOWN.to_string()
}

/// Canonical path of the current working directory.
pub fn resolve_runtime_root() -> String {
    match std::env::current_dir().and_then(|dir| dir.canonicalize()) {
        Ok(path) => path.display().to_string(),
        Err(e) => {
            error!(error = %e, "unable to determine runtime root");
            UNKNOWN.to_string()
        },
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
