//! Location and heading actions.
//!
//! Actions are the only way to reach a manager's state. They come from three
//! places: public API calls (commands), provider events, and timeout effects.

use crate::id::RequestId;
use crate::providers::{HeadingEvent, PositionEvent};
use crate::request::{HeadingRequest, LocationRequest};
use crate::state::{Heading, Location, ServiceState};

/// Input to the [`crate::LocationReducer`].
#[derive(Debug)]
pub enum LocationAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════
    /// Register a new request.
    AddRequest {
        /// The request, already bound to its consumer's handle.
        request: LocationRequest,
        /// Hold the timeout back until permission becomes `Available`.
        delay_until_authorized: bool,
    },

    /// Complete a request now: a single request times out with the best known
    /// location, a subscription ends.
    ForceComplete {
        /// Request to complete.
        id: RequestId,
    },

    /// Cancel a request without delivering anything.
    Cancel {
        /// Request to cancel.
        id: RequestId,
    },

    /// Cancel every request and stop the provider.
    Shutdown,

    // ═══════════════════════════════════════════════════════════════════════
    // Provider events
    // ═══════════════════════════════════════════════════════════════════════
    /// The provider reported a new fix.
    LocationUpdated(Location),

    /// The provider reported an error.
    ProviderFailed {
        /// Provider-supplied description.
        message: String,
    },

    /// Authorization changed.
    PermissionChanged(ServiceState),

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// A request's timeout elapsed.
    TimeoutFired {
        /// Request whose timer fired.
        id: RequestId,
    },
}

impl From<PositionEvent> for LocationAction {
    fn from(event: PositionEvent) -> Self {
        match event {
            PositionEvent::Updated(location) => Self::LocationUpdated(location),
            PositionEvent::Failed(message) => Self::ProviderFailed { message },
            PositionEvent::PermissionChanged(state) => Self::PermissionChanged(state),
        }
    }
}

/// Input to the [`crate::HeadingReducer`].
#[derive(Debug)]
pub enum HeadingAction {
    /// Register a new subscription.
    Subscribe(HeadingRequest),

    /// Cancel a subscription.
    Cancel {
        /// Subscription to cancel.
        id: RequestId,
    },

    /// Cancel every subscription and stop the provider.
    Shutdown,

    /// The provider reported a new reading.
    HeadingUpdated(Heading),

    /// The provider reported an error.
    ProviderFailed {
        /// Provider-supplied description.
        message: String,
    },
}

impl From<HeadingEvent> for HeadingAction {
    fn from(event: HeadingEvent) -> Self {
        match event {
            HeadingEvent::Updated(heading) => Self::HeadingUpdated(heading),
            HeadingEvent::Failed(message) => Self::ProviderFailed { message },
        }
    }
}
