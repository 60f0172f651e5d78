//! Location and heading state types.
//!
//! This module defines the values flowing through the managers (fixes,
//! headings, outcomes) and the state each reducer owns.

use crate::accuracy::{AccuracyLevel, AccuracyPolicy};
use crate::id::RequestId;
use crate::request::{HeadingRequest, LocationRequest, RequestKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════
// Provider data
// ═══════════════════════════════════════════════════════════════════════

/// A position fix reported by the position provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters, if known.
    pub altitude: Option<f64>,
    /// Radius of uncertainty in meters. Negative means invalid.
    pub horizontal_accuracy: f64,
    /// Direction of travel in degrees from true north, if known.
    pub course: Option<f64>,
    /// Speed in meters per second, if known.
    pub speed: Option<f64>,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a fix with only the mandatory fields set.
    #[must_use]
    pub const fn new(
        latitude: f64,
        longitude: f64,
        horizontal_accuracy: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            horizontal_accuracy,
            course: None,
            speed: None,
            timestamp,
        }
    }

    /// Set the altitude.
    #[must_use]
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Set course and speed.
    #[must_use]
    pub fn with_motion(mut self, course: f64, speed: f64) -> Self {
        self.course = Some(course);
        self.speed = Some(speed);
        self
    }

    /// Age of the fix at `now`. Fixes from the future count as fresh.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// The most precise level this fix satisfies at `now`.
    #[must_use]
    pub fn achieved_accuracy(&self, now: DateTime<Utc>) -> AccuracyLevel {
        AccuracyPolicy::achieved_for(self.horizontal_accuracy, self.age(now))
    }
}

/// A compass reading reported by the heading provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading relative to magnetic north, in degrees.
    pub magnetic_heading: f64,
    /// Heading relative to true north, in degrees. Negative when unknown.
    pub true_heading: f64,
    /// Maximum deviation in degrees. Negative means the reading is invalid.
    pub heading_accuracy: f64,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

impl Heading {
    /// Create a heading reading.
    #[must_use]
    pub const fn new(
        magnetic_heading: f64,
        true_heading: f64,
        heading_accuracy: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            magnetic_heading,
            true_heading,
            heading_accuracy,
            timestamp,
        }
    }

    /// Whether the provider vouches for this reading.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.heading_accuracy >= 0.0
    }
}

/// Authorization and availability of the position provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    /// Authorized and enabled.
    Available,
    /// The user has not been asked yet.
    NotDetermined,
    /// The user refused access.
    Denied,
    /// Access is blocked by policy (e.g. parental controls).
    Restricted,
    /// Location services are switched off system-wide.
    Disabled,
}

impl ServiceState {
    /// Whether the provider can currently deliver fixes.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }

    /// Whether the provider will not deliver fixes without user action.
    ///
    /// `NotDetermined` is not blocking: the user may still grant access.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Denied | Self::Restricted | Self::Disabled)
    }
}

/// Availability of the heading provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadingServiceState {
    /// The device can report headings.
    Available,
    /// The device has no usable compass.
    Unavailable,
}

// ═══════════════════════════════════════════════════════════════════════
// Outcomes
// ═══════════════════════════════════════════════════════════════════════

/// Final or intermediate status delivered with a [`LocationOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationStatus {
    /// A fix was delivered.
    Success,
    /// The timeout elapsed (or the request was force-completed).
    TimedOut,
    /// Authorization was never decided.
    ServicesNotDetermined,
    /// The user denied access.
    ServicesDenied,
    /// Access is restricted by policy.
    ServicesRestricted,
    /// Location services are switched off.
    ServicesDisabled,
    /// The provider reported an error.
    Error,
}

impl LocationStatus {
    /// The status reported to requests when permission moves to `state`.
    ///
    /// `None` for [`ServiceState::Available`].
    #[must_use]
    pub const fn for_service_state(state: ServiceState) -> Option<Self> {
        match state {
            ServiceState::Available => None,
            ServiceState::NotDetermined => Some(Self::ServicesNotDetermined),
            ServiceState::Denied => Some(Self::ServicesDenied),
            ServiceState::Restricted => Some(Self::ServicesRestricted),
            ServiceState::Disabled => Some(Self::ServicesDisabled),
        }
    }

    /// Stable label used for metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TimedOut => "timed_out",
            Self::ServicesNotDetermined => "services_not_determined",
            Self::ServicesDenied => "services_denied",
            Self::ServicesRestricted => "services_restricted",
            Self::ServicesDisabled => "services_disabled",
            Self::Error => "error",
        }
    }
}

/// What a location request's consumer receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOutcome {
    /// The fix, if any.
    pub location: Option<Location>,
    /// Accuracy the fix actually satisfies.
    pub achieved_accuracy: AccuracyLevel,
    /// Why the outcome was delivered.
    pub status: LocationStatus,
}

impl LocationOutcome {
    /// A successful delivery of `location`.
    #[must_use]
    pub const fn success(location: Location, achieved_accuracy: AccuracyLevel) -> Self {
        Self {
            location: Some(location),
            achieved_accuracy,
            status: LocationStatus::Success,
        }
    }

    /// A timeout carrying the best location known at that time.
    #[must_use]
    pub const fn timed_out(location: Option<Location>, achieved_accuracy: AccuracyLevel) -> Self {
        Self {
            location,
            achieved_accuracy,
            status: LocationStatus::TimedOut,
        }
    }

    /// A failure without location.
    #[must_use]
    pub const fn failed(status: LocationStatus) -> Self {
        Self {
            location: None,
            achieved_accuracy: AccuracyLevel::None,
            status,
        }
    }
}

/// Status delivered with a [`HeadingOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadingStatus {
    /// A valid reading was delivered.
    Success,
    /// The provider flagged the reading as unreliable.
    Invalid,
    /// Heading services are unavailable or failed.
    Unavailable,
}

/// What a heading subscriber receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingOutcome {
    /// The reading, if any.
    pub heading: Option<Heading>,
    /// Why the outcome was delivered.
    pub status: HeadingStatus,
}

impl HeadingOutcome {
    /// Wrap a reading, flagging it `Invalid` when its accuracy is negative.
    #[must_use]
    pub fn from_heading(heading: Heading) -> Self {
        let status = if heading.is_valid() {
            HeadingStatus::Success
        } else {
            HeadingStatus::Invalid
        };
        Self {
            heading: Some(heading),
            status,
        }
    }

    /// Heading services are not usable.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            heading: None,
            status: HeadingStatus::Unavailable,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reducer state
// ═══════════════════════════════════════════════════════════════════════

/// What the manager has asked the position provider to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStatus {
    /// Continuous updates are running.
    pub updating: bool,
    /// Significant-change monitoring is running.
    pub monitoring_significant_changes: bool,
    /// Accuracy last configured while updating.
    pub desired_accuracy: Option<AccuracyLevel>,
}

/// State owned by the location reducer.
#[derive(Debug, Default)]
pub struct LocationState {
    /// Every request that has not reached a terminal state, by id.
    pub requests: BTreeMap<RequestId, LocationRequest>,
    /// Most recent fix received from the provider.
    pub current_location: Option<Location>,
    /// Current provider configuration.
    pub provider: ProviderStatus,
}

impl LocationState {
    /// Empty state with the provider stopped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    /// Look up a registered request.
    #[must_use]
    pub fn request(&self, id: RequestId) -> Option<&LocationRequest> {
        self.requests.get(&id)
    }

    /// Stricter of the desired accuracies of every pending continuous request.
    ///
    /// `None` when no single request or subscription is pending.
    #[must_use]
    pub fn required_accuracy(&self) -> Option<AccuracyLevel> {
        self.requests
            .values()
            .filter(|request| request.is_pending() && request.kind().is_continuous())
            .map(LocationRequest::desired_accuracy)
            .reduce(AccuracyPolicy::best)
    }

    /// Whether any significant-change subscription is pending.
    #[must_use]
    pub fn wants_significant_changes(&self) -> bool {
        self.requests.values().any(|request| {
            request.is_pending() && request.kind() == RequestKind::SignificantChanges
        })
    }
}

/// State owned by the heading reducer.
#[derive(Debug, Default)]
pub struct HeadingState {
    /// Active heading subscriptions, by id.
    pub requests: BTreeMap<RequestId, HeadingRequest>,
    /// Most recent reading received from the provider.
    pub current_heading: Option<Heading>,
    /// Whether the heading provider is running.
    pub updating: bool,
}

impl HeadingState {
    /// Empty state with the provider stopped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }
}
