//! Error types for location and heading operations.
//!
//! Request outcomes (timeouts, denied permission, provider failures) are not
//! errors: they are delivered as [`crate::LocationStatus`] and
//! [`crate::HeadingStatus`]. The errors here are for misuse of the API and for
//! a manager that is already shutting down.

use crate::accuracy::AccuracyLevel;
use geoplex_runtime::StoreError;
use thiserror::Error;

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, LocationError>;

/// Errors returned by the managers' public operations.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The requested accuracy cannot be asked for.
    #[error("invalid desired accuracy: {0}")]
    InvalidAccuracy(AccuracyLevel),

    /// The manager's store rejected the action (usually: shutting down).
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while building or validating a [`crate::LocationConfig`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value that is not allowed.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("failed to parse {var}={value:?}")]
    Parse {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LocationError::InvalidAccuracy(AccuracyLevel::None).to_string(),
            "invalid desired accuracy: none"
        );
        assert_eq!(
            LocationError::from(StoreError::ShutdownInProgress).to_string(),
            "store error: Store is shutting down"
        );
        assert_eq!(
            ConfigError::Parse {
                var: "GEOPLEX_HEADING_FILTER_DEGREES",
                value: "north".to_string(),
            }
            .to_string(),
            "failed to parse GEOPLEX_HEADING_FILTER_DEGREES=\"north\""
        );
    }
}
