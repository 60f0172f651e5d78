//! Request state machines.
//!
//! A [`LocationRequest`] moves from `Pending` to exactly one of `Completed`,
//! `TimedOut` or `Cancelled`:
//!
//! ```text
//! Pending ──(timer armed)──→ Pending ──┬─→ Completed
//!                                      ├─→ TimedOut
//!                                      └─→ Cancelled
//! ```
//!
//! Requests never deliver on their own. The reducer decides when a request
//! completes; the request only guarantees that a single-shot consumer hears
//! from it at most once and that a cancelled consumer never hears from it.

use crate::accuracy::{AccuracyLevel, AccuracyPolicy, Thresholds};
use crate::actions::LocationAction;
use crate::handle::{HeadingSubscription, LocationSubscription, PendingLocation};
use crate::id::RequestId;
use crate::state::{HeadingOutcome, LocationOutcome, LocationStatus};
use geoplex_core::effect::{Effect, EffectId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Reported for requests without a desired level.
const UNSATISFIABLE: Thresholds = Thresholds {
    max_horizontal_distance: 0.0,
    max_age: Duration::ZERO,
};

/// What a location request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// One fix, delivered once.
    Single,
    /// Every continuous update until cancelled.
    Subscription,
    /// Every significant-change update until cancelled.
    SignificantChanges,
}

impl RequestKind {
    /// Whether the request delivers more than once.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        !matches!(self, Self::Single)
    }

    /// Whether the request needs continuous updates from the provider.
    #[must_use]
    pub const fn is_continuous(self) -> bool {
        matches!(self, Self::Single | Self::Subscription)
    }

    /// Stable label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Subscription => "subscription",
            Self::SignificantChanges => "significant_changes",
        }
    }
}

/// Lifecycle phase of a [`LocationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestPhase {
    /// Waiting for a qualifying fix (or, for subscriptions, active).
    Pending,
    /// Delivered a final outcome other than a timeout.
    Completed,
    /// Delivered a timeout outcome.
    TimedOut,
    /// Cancelled without delivering.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Armed,
    Fired,
}

#[derive(Debug)]
enum Delivery {
    Once(oneshot::Sender<LocationOutcome>),
    Recurring(mpsc::UnboundedSender<LocationOutcome>),
}

/// A single location request or subscription.
#[derive(Debug)]
pub struct LocationRequest {
    id: RequestId,
    kind: RequestKind,
    desired_accuracy: AccuracyLevel,
    timeout: Duration,
    timer: TimerState,
    armed_at: Option<Instant>,
    phase: RequestPhase,
    delivery: Option<Delivery>,
}

impl LocationRequest {
    /// A single-shot request and the handle its outcome arrives on.
    ///
    /// A zero `timeout` means the request never times out.
    #[must_use]
    pub fn single(
        id: RequestId,
        desired_accuracy: AccuracyLevel,
        timeout: Duration,
    ) -> (Self, PendingLocation) {
        let (tx, rx) = oneshot::channel();
        let request = Self::with_delivery(
            id,
            RequestKind::Single,
            desired_accuracy,
            timeout,
            Delivery::Once(tx),
        );
        (request, PendingLocation::new(id, rx))
    }

    /// A continuous subscription and the stream its updates arrive on.
    #[must_use]
    pub fn subscription(
        id: RequestId,
        desired_accuracy: AccuracyLevel,
    ) -> (Self, LocationSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let request = Self::with_delivery(
            id,
            RequestKind::Subscription,
            desired_accuracy,
            Duration::ZERO,
            Delivery::Recurring(tx),
        );
        (request, LocationSubscription::new(id, rx))
    }

    /// A significant-change subscription and the stream its updates arrive on.
    #[must_use]
    pub fn significant_changes(id: RequestId) -> (Self, LocationSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let request = Self::with_delivery(
            id,
            RequestKind::SignificantChanges,
            AccuracyLevel::None,
            Duration::ZERO,
            Delivery::Recurring(tx),
        );
        (request, LocationSubscription::new(id, rx))
    }

    fn with_delivery(
        id: RequestId,
        kind: RequestKind,
        desired_accuracy: AccuracyLevel,
        timeout: Duration,
        delivery: Delivery,
    ) -> Self {
        Self {
            id,
            kind,
            desired_accuracy,
            timeout,
            timer: TimerState::Idle,
            armed_at: None,
            phase: RequestPhase::Pending,
            delivery: Some(delivery),
        }
    }

    /// The request's identifier.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// What the request asks for.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Whether the request delivers more than once.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.kind.is_recurring()
    }

    /// Desired accuracy; [`AccuracyLevel::None`] for significant changes.
    #[must_use]
    pub const fn desired_accuracy(&self) -> AccuracyLevel {
        self.desired_accuracy
    }

    /// Configured timeout, zero when the request never times out.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Whether the request is still waiting (or, for subscriptions, active).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.phase == RequestPhase::Pending
    }

    /// Whether the timeout timer is currently running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer == TimerState::Armed
    }

    /// Whether the timeout has fired (or was forced).
    #[must_use]
    pub fn has_timed_out(&self) -> bool {
        self.timer == TimerState::Fired
    }

    /// Time since the timeout timer was armed, zero if it never was.
    #[must_use]
    pub fn time_alive(&self) -> Duration {
        self.armed_at.map_or(Duration::ZERO, |since| since.elapsed())
    }

    /// Largest horizontal accuracy (meters) that satisfies this request.
    #[must_use]
    pub fn horizontal_accuracy_threshold(&self) -> f64 {
        self.thresholds().max_horizontal_distance
    }

    /// Oldest fix that satisfies this request.
    #[must_use]
    pub fn update_time_stale_threshold(&self) -> Duration {
        self.thresholds().max_age
    }

    fn thresholds(&self) -> Thresholds {
        AccuracyPolicy::thresholds(self.desired_accuracy).unwrap_or(UNSATISFIABLE)
    }

    /// Whether a fix with this accuracy and age satisfies the request.
    #[must_use]
    pub fn is_satisfied_by(&self, horizontal_accuracy: f64, age: Duration) -> bool {
        AccuracyPolicy::thresholds(self.desired_accuracy)
            .is_some_and(|limits| limits.is_met_by(horizontal_accuracy, age))
    }

    /// Identifier of this request's timeout effect.
    #[must_use]
    pub const fn timer_id(&self) -> EffectId {
        EffectId::new(self.id.get())
    }

    /// Arm the timeout timer if the request has one and it is not running yet.
    ///
    /// Returns the timer effect to hand to the runtime. When it fires it feeds
    /// [`LocationAction::TimeoutFired`] back into the manager.
    pub fn start_timeout_timer_if_needed(&mut self) -> Option<Effect<LocationAction>> {
        if self.timeout.is_zero() || !self.is_pending() || self.timer != TimerState::Idle {
            return None;
        }

        self.timer = TimerState::Armed;
        self.armed_at = Some(Instant::now());
        Some(Effect::delay(
            self.timer_id(),
            self.timeout,
            LocationAction::TimeoutFired { id: self.id },
        ))
    }

    /// Record that the timer fired.
    ///
    /// Returns `true` only the first time, and only while the request is
    /// pending; every later or stale notification returns `false`.
    pub fn timer_fired(&mut self) -> bool {
        if self.is_pending() && self.timer == TimerState::Armed {
            self.timer = TimerState::Fired;
            true
        } else {
            false
        }
    }

    /// Mark the request as timed out now, whatever its timer says.
    pub fn force_timeout(&mut self) -> Option<Effect<LocationAction>> {
        if !self.is_pending() {
            return None;
        }
        let cancel = self.disarm();
        self.timer = TimerState::Fired;
        cancel
    }

    /// Deliver a final outcome. First call wins; later calls are no-ops.
    ///
    /// Returns the effect that stops a still-running timer.
    pub fn complete(&mut self, outcome: LocationOutcome) -> Option<Effect<LocationAction>> {
        if !self.is_pending() {
            return None;
        }
        let cancel = self.disarm();
        self.phase = if outcome.status == LocationStatus::TimedOut {
            RequestPhase::TimedOut
        } else {
            RequestPhase::Completed
        };

        // A consumer that stopped listening is not an error.
        match self.delivery.take() {
            Some(Delivery::Once(tx)) => {
                let _ = tx.send(outcome);
            },
            Some(Delivery::Recurring(tx)) => {
                let _ = tx.send(outcome);
            },
            None => {},
        }
        cancel
    }

    /// Deliver an intermediate outcome to a recurring request.
    ///
    /// Returns `false` when the request cannot take it: not recurring, no
    /// longer pending, or its consumer has gone away.
    pub fn notify(&mut self, outcome: LocationOutcome) -> bool {
        if !self.is_pending() {
            return false;
        }
        match &self.delivery {
            Some(Delivery::Recurring(tx)) => tx.send(outcome).is_ok(),
            _ => false,
        }
    }

    /// Whether the consumer dropped its handle while the request was pending.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        match &self.delivery {
            Some(Delivery::Once(tx)) => tx.is_closed(),
            Some(Delivery::Recurring(tx)) => tx.is_closed(),
            None => false,
        }
    }

    /// Cancel without delivering. Idempotent, and a no-op once completed.
    ///
    /// Dropping the delivery channel ends a subscription's stream.
    pub fn cancel(&mut self) -> Option<Effect<LocationAction>> {
        if !self.is_pending() {
            return None;
        }
        let cancel = self.disarm();
        self.phase = RequestPhase::Cancelled;
        self.delivery = None;
        cancel
    }

    fn disarm(&mut self) -> Option<Effect<LocationAction>> {
        if self.timer == TimerState::Armed {
            self.timer = TimerState::Idle;
            Some(Effect::Cancel(self.timer_id()))
        } else {
            None
        }
    }
}

/// A heading subscription.
///
/// Heading subscriptions have no timeout; they stay active until cancelled
/// or until heading services fail.
#[derive(Debug)]
pub struct HeadingRequest {
    id: RequestId,
    delivery: Option<mpsc::UnboundedSender<HeadingOutcome>>,
}

impl HeadingRequest {
    /// A subscription and the stream its readings arrive on.
    #[must_use]
    pub fn new(id: RequestId) -> (Self, HeadingSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                delivery: Some(tx),
            },
            HeadingSubscription::new(id, rx),
        )
    }

    /// The subscription's identifier.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Heading subscriptions always deliver repeatedly.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        true
    }

    /// Whether the subscription can still receive readings.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.delivery.is_some()
    }

    /// Whether the consumer dropped its stream.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.delivery
            .as_ref()
            .is_some_and(mpsc::UnboundedSender::is_closed)
    }

    /// Deliver a reading. Returns `false` if inactive or the consumer is gone.
    pub fn notify(&mut self, outcome: HeadingOutcome) -> bool {
        self.delivery
            .as_ref()
            .is_some_and(|tx| tx.send(outcome).is_ok())
    }

    /// Deliver a final outcome and close the stream.
    pub fn complete(&mut self, outcome: HeadingOutcome) {
        if let Some(tx) = self.delivery.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Close the stream without delivering. Idempotent.
    pub fn cancel(&mut self) {
        self.delivery = None;
    }
}
