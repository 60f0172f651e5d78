//! Reducer environments.
//!
//! Everything a reducer talks to besides its own state is injected here, so
//! tests can swap the hardware for mocks and the wall clock for a fixed one.

use geoplex_core::environment::{Clock, SystemClock};

use crate::providers::{HeadingProvider, PositionProvider};

/// Dependencies of the location reducer.
///
/// # Type Parameters
///
/// - `P`: Position provider
/// - `C`: Clock used to measure the age of fixes
#[derive(Debug, Clone)]
pub struct LocationEnvironment<P, C = SystemClock>
where
    P: PositionProvider + Clone,
    C: Clock + Clone,
{
    /// The position provider.
    pub provider: P,

    /// Wall clock for staleness checks.
    pub clock: C,
}

impl<P, C> LocationEnvironment<P, C>
where
    P: PositionProvider + Clone,
    C: Clock + Clone,
{
    /// Create a new environment.
    #[must_use]
    pub const fn new(provider: P, clock: C) -> Self {
        Self { provider, clock }
    }
}

/// Dependencies of the heading reducer.
#[derive(Debug, Clone)]
pub struct HeadingEnvironment<H>
where
    H: HeadingProvider + Clone,
{
    /// The heading provider.
    pub provider: H,

    /// Filter passed to the provider whenever it is started, in degrees.
    pub filter_degrees: f64,
}

impl<H> HeadingEnvironment<H>
where
    H: HeadingProvider + Clone,
{
    /// Create a new environment.
    #[must_use]
    pub const fn new(provider: H, filter_degrees: f64) -> Self {
        Self {
            provider,
            filter_degrees,
        }
    }
}
