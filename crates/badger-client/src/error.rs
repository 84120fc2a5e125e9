//! Errors surfaced while building a notifier.
//!
//! Reporting itself never fails from the caller's point of view; these are
//! all construction-time problems.

use badger_delivery::DeliveryError;
use thiserror::Error;

/// Result type alias for notifier construction.
pub type Result<T> = std::result::Result<T, NotifierError>;

/// Failures while loading configuration or building a notifier.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// A configuration value is present but unusable.
    #[error("invalid notifier configuration: {message}")]
    Configuration {
        /// What is wrong and with which setting
        message: String,
    },

    /// The delivery layer could not be set up.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A configuration source could not be read or extracted.
    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl NotifierError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

impl From<figment::Error> for NotifierError {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        assert_eq!(
            NotifierError::configuration("worker_count must be greater than 0").to_string(),
            "invalid notifier configuration: worker_count must be greater than 0"
        );
        assert_eq!(
            NotifierError::from(DeliveryError::configuration("bad TLS root")).to_string(),
            "invalid delivery configuration: bad TLS root"
        );
    }
}
