//! Deny lists applied before anything reaches the wire.
//!
//! Fixed at client construction and never mutated afterwards, so they are
//! shared across workers without locking.

use std::collections::HashSet;

/// Property holding the API key.
pub const API_KEY_PROPERTY: &str = "honeybadger.api_key";

/// Property overriding the notices endpoint.
pub const ENDPOINT_PROPERTY: &str = "honeybadger.url";

/// Comma-delimited list of properties never sent.
pub const EXCLUDED_PROPERTIES_PROPERTY: &str = "honeybadger.excluded_sys_props";

/// Comma-delimited list of exception classes never reported.
pub const EXCLUDED_CLASSES_PROPERTY: &str = "honeybadger.excluded_exception_classes";

/// Type name of the delivery pipeline's own error type.
///
/// Reporting it would let a failing endpoint feed its own failures back
/// into the queue, so it is always excluded.
pub const INTERNAL_ERROR_CLASS: &str = "badger_delivery::error::DeliveryError";

/// Properties that are excluded whatever the configuration says.
pub const MANDATORY_EXCLUDED_PROPERTIES: [&str; 3] =
    [API_KEY_PROPERTY, EXCLUDED_PROPERTIES_PROPERTY, ENDPOINT_PROPERTY];

/// Excluded system-property keys and excluded exception class names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSets {
    system_properties: HashSet<String>,
    exception_classes: HashSet<String>,
}

impl Default for ExclusionSets {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>(), std::iter::empty::<String>())
    }
}

impl ExclusionSets {
    /// Builds the sets from explicit entries plus the mandatory defaults.
    pub fn new<P, C>(properties: P, classes: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut system_properties: HashSet<String> =
            MANDATORY_EXCLUDED_PROPERTIES.iter().map(|key| (*key).to_string()).collect();
        system_properties.extend(properties.into_iter().map(Into::into));

        let mut exception_classes = HashSet::from([INTERNAL_ERROR_CLASS.to_string()]);
        exception_classes.extend(classes.into_iter().map(Into::into));

        Self { system_properties, exception_classes }
    }

    /// Builds the sets from comma-delimited lists as found in configuration.
    pub fn from_lists(properties: Option<&str>, classes: Option<&str>) -> Self {
        Self::new(split_list(properties), split_list(classes))
    }

    /// Whether `key` must be left out of `server.system_properties`.
    pub fn is_excluded_property(&self, key: &str) -> bool {
        self.system_properties.contains(key)
    }

    /// Whether events of `class_name` are dropped before delivery.
    pub fn is_excluded_class(&self, class_name: &str) -> bool {
        self.exception_classes.contains(class_name)
    }

    /// Excluded property keys.
    pub fn system_properties(&self) -> &HashSet<String> {
        &self.system_properties
    }

    /// Excluded exception class names.
    pub fn exception_classes(&self) -> &HashSet<String> {
        &self.exception_classes
    }
}

/// Splits a comma-delimited list, trimming entries and skipping blanks.
pub fn split_list(list: Option<&str>) -> Vec<String> {
    list.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
