//! # Geoplex Location
//!
//! Multiplexes many independent location and heading requests onto one
//! position provider and one heading provider, keeping the providers in the
//! cheapest configuration that still satisfies every outstanding request.
//!
//! ## Features
//!
//! - **One-shot requests**: "give me a fix at least this precise within N seconds"
//! - **Subscriptions**: continuous updates, significant-change updates, heading updates
//! - **Power arbitration**: provider accuracy tracks the most demanding pending request
//!   and the provider is stopped as soon as nothing needs it
//! - **Testable**: reducers run without hardware, mocks record every provider call
//!
//! ## Architecture
//!
//! Each manager wraps a [`geoplex_runtime::Store`]. Public calls, provider
//! events and timeout fires all become actions processed one at a time:
//!
//! ```text
//! request_location ─┐
//! provider event  ──┼─→ Action → Reducer → (State, Effects) → timers → TimeoutFired
//! timer fire      ──┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use geoplex_location::*;
//! use std::time::Duration;
//!
//! let services = LocationServices::new(position, heading, LocationConfig::default())?;
//!
//! let pending = services
//!     .request_location(AccuracyLevel::Block, Duration::from_secs(10), false)
//!     .await?;
//!
//! if let Some(outcome) = pending.outcome().await {
//!     println!("{:?}: {:?}", outcome.status, outcome.location);
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod accuracy;
pub mod actions;
pub mod config;
pub mod environment;
pub mod error;
pub mod handle;
pub mod id;
pub mod manager;
pub mod providers;
pub mod reducers;
pub mod request;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use accuracy::{AccuracyLevel, AccuracyPolicy, Thresholds};
pub use actions::{HeadingAction, LocationAction};
pub use config::LocationConfig;
pub use environment::{HeadingEnvironment, LocationEnvironment};
pub use error::{ConfigError, LocationError, Result};
pub use handle::{HeadingSubscription, LocationSubscription, PendingLocation};
pub use id::{RequestId, RequestIdAllocator};
pub use manager::{HeadingManager, LocationManager, LocationServices};
pub use providers::{HeadingEvent, HeadingProvider, PositionEvent, PositionProvider};
pub use reducers::{HeadingReducer, LocationReducer};
pub use request::{HeadingRequest, LocationRequest, RequestKind, RequestPhase};
pub use state::{
    Heading, HeadingOutcome, HeadingServiceState, HeadingState, HeadingStatus, Location,
    LocationOutcome, LocationState, LocationStatus, ServiceState,
};
