//! # Geoplex Testing
//!
//! Testing utilities and helpers for geoplex reducers and stores.
//!
//! This crate provides:
//! - Deterministic clocks for staleness checks
//! - A Given-When-Then [`ReducerTest`] builder and effect assertions
//! - Tracing initialisation for tests
//!
//! ## Example
//!
//! ```ignore
//! use geoplex_testing::{init_tracing, test_clock};
//!
//! #[tokio::test]
//! async fn test_single_request() {
//!     init_tracing();
//!     let (manager, provider) = test_manager(test_clock());
//!     let pending = manager.request_location(AccuracyLevel::Block, timeout, false).await?;
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use geoplex_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use geoplex_testing::mocks::FixedClock;
    /// use geoplex_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// A timestamp `seconds` before this clock's time
        #[must_use]
        pub fn seconds_ago(&self, seconds: i64) -> DateTime<Utc> {
            self.time - chrono::Duration::seconds(seconds)
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber for tests
///
/// Honours `RUST_LOG` and falls back to `debug` for the geoplex crates.
/// Safe to call from every test: only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoplex_location=debug,geoplex_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
pub use reducer_test::{assertions, ReducerTest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_seconds_ago() {
        let clock = test_clock();
        let past = clock.seconds_ago(30);
        assert_eq!((clock.now() - past).num_seconds(), 30);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
