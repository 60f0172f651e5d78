//! Location services configuration.
//!
//! Configuration can be built in code with the `with_*` methods or loaded
//! from environment variables:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `GEOPLEX_SUBSCRIPTION_ACCURACY` | `default_subscription_accuracy` | `room` |
//! | `GEOPLEX_HEADING_FILTER_DEGREES` | `heading_filter_degrees` | `1.0` |
//! | `GEOPLEX_SHUTDOWN_TIMEOUT_SECS` | `store.default_shutdown_timeout` | `30` |
//!
//! # Example
//!
//! ```
//! use geoplex_location::{AccuracyLevel, LocationConfig};
//!
//! let config = LocationConfig::default()
//!     .with_subscription_accuracy(AccuracyLevel::House)
//!     .with_heading_filter(5.0);
//! assert!(config.validate().is_ok());
//! ```

use crate::accuracy::AccuracyLevel;
use crate::error::ConfigError;
use geoplex_runtime::StoreConfig;
use std::time::Duration;

const SUBSCRIPTION_ACCURACY_VAR: &str = "GEOPLEX_SUBSCRIPTION_ACCURACY";
const HEADING_FILTER_VAR: &str = "GEOPLEX_HEADING_FILTER_DEGREES";
const SHUTDOWN_TIMEOUT_VAR: &str = "GEOPLEX_SHUTDOWN_TIMEOUT_SECS";

/// Configuration shared by the location and heading managers.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// Accuracy used for subscriptions that do not name one.
    ///
    /// Default: [`AccuracyLevel::Room`]
    pub default_subscription_accuracy: AccuracyLevel,

    /// Minimum heading change, in degrees, before the compass reports again.
    ///
    /// Default: 1 degree
    pub heading_filter_degrees: f64,

    /// Runtime settings for both managers' stores.
    pub store: StoreConfig,
}

impl LocationConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accuracy used for subscriptions that do not name one.
    #[must_use]
    pub const fn with_subscription_accuracy(mut self, level: AccuracyLevel) -> Self {
        self.default_subscription_accuracy = level;
        self
    }

    /// Set the heading filter.
    #[must_use]
    pub const fn with_heading_filter(mut self, degrees: f64) -> Self {
        self.heading_filter_degrees = degrees;
        self
    }

    /// Set how long shutdown waits for running effects.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.store.default_shutdown_timeout = timeout;
        self
    }

    /// Load configuration from `GEOPLEX_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for unparsable values and
    /// [`ConfigError::Invalid`] if the result fails [`LocationConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`LocationConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(SUBSCRIPTION_ACCURACY_VAR) {
            config.default_subscription_accuracy =
                value.parse().map_err(|_| ConfigError::Parse {
                    var: SUBSCRIPTION_ACCURACY_VAR,
                    value,
                })?;
        }

        if let Some(value) = lookup(HEADING_FILTER_VAR) {
            config.heading_filter_degrees =
                value.trim().parse().map_err(|_| ConfigError::Parse {
                    var: HEADING_FILTER_VAR,
                    value,
                })?;
        }

        if let Some(value) = lookup(SHUTDOWN_TIMEOUT_VAR) {
            let secs: u64 = value.trim().parse().map_err(|_| ConfigError::Parse {
                var: SHUTDOWN_TIMEOUT_VAR,
                value,
            })?;
            config.store.default_shutdown_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the subscription accuracy is
    /// [`AccuracyLevel::None`] or the heading filter is negative or not finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_subscription_accuracy.is_requestable() {
            return Err(ConfigError::Invalid {
                field: "default_subscription_accuracy",
                reason: "must not be none".to_string(),
            });
        }
        if !self.heading_filter_degrees.is_finite() || self.heading_filter_degrees < 0.0 {
            return Err(ConfigError::Invalid {
                field: "heading_filter_degrees",
                reason: format!("must be a finite, non-negative number (got {})", self.heading_filter_degrees),
            });
        }
        Ok(())
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_subscription_accuracy: AccuracyLevel::Room,
            heading_filter_degrees: 1.0,
            store: StoreConfig::default(),
        }
    }
}
