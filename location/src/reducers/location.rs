//! Location request reducer.
//!
//! Owns the registry of outstanding location requests and keeps the position
//! provider configured for them.
//!
//! # Flow
//!
//! 1. A request is registered; its timeout timer is armed unless it waits
//!    for authorization
//! 2. Each fix completes the single requests it satisfies and is forwarded
//!    to every subscription
//! 3. Timeouts, permission loss and provider errors complete the rest
//! 4. After every change the provider is re-arbitrated: its accuracy follows
//!    the strictest pending request and it stops when nothing needs it

use crate::accuracy::AccuracyPolicy;
use crate::actions::LocationAction;
use crate::environment::LocationEnvironment;
use crate::id::RequestId;
use crate::providers::PositionProvider;
use crate::request::{LocationRequest, RequestKind};
use crate::state::{Location, LocationOutcome, LocationState, LocationStatus, ServiceState};
use geoplex_core::effect::Effect;
use geoplex_core::environment::Clock;
use geoplex_core::reducer::Reducer;
use geoplex_core::{smallvec, SmallVec};
use std::marker::PhantomData;

type Effects = SmallVec<[Effect<LocationAction>; 4]>;

/// Location request reducer.
#[derive(Debug, Clone)]
pub struct LocationReducer<P, C> {
    _phantom: PhantomData<(P, C)>,
}

impl<P, C> LocationReducer<P, C> {
    /// Create a new location reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<P, C> Default for LocationReducer<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, C> LocationReducer<P, C>
where
    P: PositionProvider + Clone,
    C: Clock + Clone,
{
    fn add_request(
        state: &mut LocationState,
        mut request: LocationRequest,
        delay_until_authorized: bool,
        env: &LocationEnvironment<P, C>,
    ) -> Effects {
        let id = request.id();
        let mut effects = Effects::new();

        if state.requests.contains_key(&id) {
            tracing::warn!(request_id = %id, "Ignoring request with duplicate id");
            return effects;
        }

        tracing::debug!(
            request_id = %id,
            kind = request.kind().as_str(),
            accuracy = %request.desired_accuracy(),
            timeout_ms = u64::try_from(request.timeout().as_millis()).unwrap_or(u64::MAX),
            "Location request added"
        );
        metrics::counter!("location.requests.created", "kind" => request.kind().as_str())
            .increment(1);

        let permission = env.provider.permission_state();
        if !delay_until_authorized || permission.is_available() {
            effects.extend(request.start_timeout_timer_if_needed());
        } else {
            tracing::debug!(request_id = %id, "Timeout deferred until authorized");
        }
        state.requests.insert(id, request);

        if permission.is_blocking() {
            if let Some(status) = LocationStatus::for_service_state(permission) {
                tracing::info!(?permission, "Location services unusable, completing all requests");
                effects.extend(Self::complete_all(state, &LocationOutcome::failed(status)));
            }
        }

        effects
    }

    fn location_updated(
        state: &mut LocationState,
        location: Location,
        env: &LocationEnvironment<P, C>,
    ) -> Effects {
        let mut effects = Effects::new();
        let age = location.age(env.clock.now());
        let achieved = AccuracyPolicy::achieved_for(location.horizontal_accuracy, age);
        let mut finished = Vec::new();

        tracing::trace!(
            horizontal_accuracy = location.horizontal_accuracy,
            age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
            %achieved,
            "Location update"
        );

        for (id, request) in &mut state.requests {
            let outcome = LocationOutcome::success(location.clone(), achieved);
            match request.kind() {
                RequestKind::Single => {
                    if request.is_satisfied_by(location.horizontal_accuracy, age) {
                        tracing::debug!(request_id = %id, %achieved, "Location request satisfied");
                        effects.extend(request.complete(outcome));
                        record_completion(LocationStatus::Success);
                        finished.push(*id);
                    }
                },
                RequestKind::Subscription | RequestKind::SignificantChanges => {
                    if !request.notify(outcome) {
                        tracing::debug!(request_id = %id, "Subscriber dropped, removing subscription");
                        effects.extend(request.cancel());
                        finished.push(*id);
                    }
                },
            }
        }

        for id in finished {
            state.requests.remove(&id);
        }

        state.current_location = Some(location);
        effects
    }

    fn timeout_fired(
        state: &mut LocationState,
        id: RequestId,
        env: &LocationEnvironment<P, C>,
    ) -> Effects {
        let Some(request) = state.requests.get_mut(&id) else {
            tracing::debug!(request_id = %id, "Timeout for unknown request ignored");
            return Effects::new();
        };

        if !request.timer_fired() {
            tracing::debug!(request_id = %id, "Stale timeout ignored");
            return Effects::new();
        }

        tracing::debug!(request_id = %id, "Location request timed out");
        let outcome = Self::best_effort_outcome(state.current_location.as_ref(), env);
        Self::finish(state, id, outcome)
    }

    fn force_complete(
        state: &mut LocationState,
        id: RequestId,
        env: &LocationEnvironment<P, C>,
    ) -> Effects {
        let Some(request) = state.requests.get_mut(&id) else {
            tracing::debug!(request_id = %id, "Force-complete for unknown request ignored");
            return Effects::new();
        };

        if request.is_recurring() {
            tracing::debug!(request_id = %id, "Subscription force-completed");
            let effects: Effects = request.cancel().into_iter().collect();
            state.requests.remove(&id);
            return effects;
        }

        tracing::debug!(request_id = %id, "Location request force-completed");
        let mut effects: Effects = request.force_timeout().into_iter().collect();
        let outcome = Self::best_effort_outcome(state.current_location.as_ref(), env);
        effects.extend(Self::finish(state, id, outcome));
        effects
    }

    fn cancel(state: &mut LocationState, id: RequestId) -> Effects {
        match state.requests.remove(&id) {
            Some(mut request) => {
                tracing::debug!(request_id = %id, kind = request.kind().as_str(), "Location request cancelled");
                request.cancel().into_iter().collect()
            },
            None => {
                tracing::debug!(request_id = %id, "Cancel for unknown request ignored");
                Effects::new()
            },
        }
    }

    fn permission_changed(state: &mut LocationState, permission: ServiceState) -> Effects {
        match LocationStatus::for_service_state(permission) {
            None => {
                tracing::info!("Location services authorized");
                state
                    .requests
                    .values_mut()
                    .filter_map(LocationRequest::start_timeout_timer_if_needed)
                    .collect()
            },
            Some(status) => {
                tracing::info!(?permission, "Location services unavailable, completing all requests");
                Self::complete_all(state, &LocationOutcome::failed(status))
            },
        }
    }

    fn shutdown(state: &mut LocationState) -> Effects {
        tracing::info!(pending = state.requests.len(), "Cancelling all location requests");
        let mut effects = Effects::new();
        for (_, mut request) in std::mem::take(&mut state.requests) {
            effects.extend(request.cancel());
        }
        effects
    }

    /// Drop requests whose consumer went away without cancelling.
    fn prune_abandoned(state: &mut LocationState) -> Effects {
        let abandoned: Vec<RequestId> = state
            .requests
            .iter()
            .filter(|(_, request)| request.is_abandoned())
            .map(|(id, _)| *id)
            .collect();

        let mut effects = Effects::new();
        for id in abandoned {
            if let Some(mut request) = state.requests.remove(&id) {
                tracing::debug!(request_id = %id, kind = request.kind().as_str(), "Handle dropped, removing request");
                effects.extend(request.cancel());
            }
        }
        effects
    }

    /// Timed-out outcome carrying the most recent fix, falling back to the
    /// provider's last known location.
    fn best_effort_outcome(
        current: Option<&Location>,
        env: &LocationEnvironment<P, C>,
    ) -> LocationOutcome {
        let location = current.cloned().or_else(|| env.provider.last_known_location());
        let achieved = location
            .as_ref()
            .map(|l| l.achieved_accuracy(env.clock.now()))
            .unwrap_or_default();
        LocationOutcome::timed_out(location, achieved)
    }

    /// Deliver `outcome` to one request and drop it from the registry.
    fn finish(state: &mut LocationState, id: RequestId, outcome: LocationOutcome) -> Effects {
        let Some(mut request) = state.requests.remove(&id) else {
            return Effects::new();
        };
        let status = outcome.status;
        let effects = request.complete(outcome).into_iter().collect();
        record_completion(status);
        effects
    }

    /// Deliver `outcome` to every request and clear the registry.
    fn complete_all(state: &mut LocationState, outcome: &LocationOutcome) -> Effects {
        let mut effects = Effects::new();
        for (id, mut request) in std::mem::take(&mut state.requests) {
            tracing::debug!(request_id = %id, status = outcome.status.as_str(), "Location request completed");
            effects.extend(request.complete(outcome.clone()));
            record_completion(outcome.status);
        }
        effects
    }

    /// Bring the provider in line with the registry.
    fn arbitrate(state: &mut LocationState, env: &LocationEnvironment<P, C>) {
        let provider = &env.provider;

        match state.required_accuracy() {
            Some(level) => {
                if state.provider.desired_accuracy != Some(level) {
                    tracing::debug!(accuracy = %level, "Reconfiguring provider accuracy");
                    provider.set_desired_accuracy(level);
                    state.provider.desired_accuracy = Some(level);
                }
                if !state.provider.updating {
                    tracing::info!(accuracy = %level, "Starting location updates");
                    provider.start_updating();
                    state.provider.updating = true;
                }
            },
            None => {
                if state.provider.updating {
                    tracing::info!("Stopping location updates");
                    provider.stop_updating();
                    state.provider.updating = false;
                }
                state.provider.desired_accuracy = None;
            },
        }

        let wants_significant = state.wants_significant_changes();
        if wants_significant != state.provider.monitoring_significant_changes {
            if wants_significant {
                tracing::info!("Starting significant location change monitoring");
                provider.start_monitoring_significant_changes();
            } else {
                tracing::info!("Stopping significant location change monitoring");
                provider.stop_monitoring_significant_changes();
            }
            state.provider.monitoring_significant_changes = wants_significant;
        }

        #[allow(clippy::cast_precision_loss)] // Request counts stay far below 2^52
        metrics::gauge!("location.requests.pending").set(state.requests.len() as f64);
    }
}

fn record_completion(status: LocationStatus) {
    metrics::counter!("location.requests.completed", "status" => status.as_str()).increment(1);
}

impl<P, C> Reducer for LocationReducer<P, C>
where
    P: PositionProvider + Clone,
    C: Clock + Clone,
{
    type State = LocationState;
    type Action = LocationAction;
    type Environment = LocationEnvironment<P, C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut effects = match action {
            LocationAction::AddRequest {
                request,
                delay_until_authorized,
            } => Self::add_request(state, request, delay_until_authorized, env),
            LocationAction::ForceComplete { id } => Self::force_complete(state, id, env),
            LocationAction::Cancel { id } => Self::cancel(state, id),
            LocationAction::Shutdown => Self::shutdown(state),
            LocationAction::LocationUpdated(location) => {
                Self::location_updated(state, location, env)
            },
            LocationAction::ProviderFailed { message } => {
                tracing::warn!(%message, "Position provider failed, completing all requests");
                Self::complete_all(state, &LocationOutcome::failed(LocationStatus::Error))
            },
            LocationAction::PermissionChanged(permission) => {
                Self::permission_changed(state, permission)
            },
            LocationAction::TimeoutFired { id } => Self::timeout_fired(state, id, env),
        };

        effects.extend(Self::prune_abandoned(state));
        Self::arbitrate(state, env);

        if effects.is_empty() {
            smallvec![Effect::None]
        } else {
            effects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accuracy::AccuracyLevel;
    use crate::handle::PendingLocation;
    use crate::mocks::{MockPositionProvider, PositionCall};
    use geoplex_testing::{assertions, test_clock, FixedClock, ReducerTest};
    use std::time::Duration;

    type TestReducer = LocationReducer<MockPositionProvider, FixedClock>;

    fn env(provider: &MockPositionProvider) -> LocationEnvironment<MockPositionProvider, FixedClock> {
        LocationEnvironment::new(provider.clone(), test_clock())
    }

    fn single(id: u64, level: AccuracyLevel, timeout_secs: u64) -> (LocationRequest, PendingLocation) {
        LocationRequest::single(RequestId::new(id), level, Duration::from_secs(timeout_secs))
    }

    fn add(request: LocationRequest) -> LocationAction {
        LocationAction::AddRequest {
            request,
            delay_until_authorized: false,
        }
    }

    fn state_with(requests: Vec<LocationRequest>) -> LocationState {
        let mut state = LocationState::new();
        for request in requests {
            state.requests.insert(request.id(), request);
        }
        state
    }

    #[tokio::test]
    async fn test_add_arms_timer_and_starts_provider() {
        let provider = MockPositionProvider::new();
        let (request, _pending) = single(1, AccuracyLevel::Block, 10);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(LocationState::new())
            .when_action(add(request))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 1);
                assert!(state.provider.updating);
                assert_eq!(state.provider.desired_accuracy, Some(AccuracyLevel::Block));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_arms_timer(effects);
            })
            .run();

        assert_eq!(
            provider.calls(),
            vec![
                PositionCall::SetDesiredAccuracy(AccuracyLevel::Block),
                PositionCall::StartUpdating,
            ]
        );
    }

    #[tokio::test]
    async fn test_add_with_zero_timeout_has_no_timer() {
        let provider = MockPositionProvider::new();
        let (request, _pending) = single(1, AccuracyLevel::City, 0);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(LocationState::new())
            .when_action(add(request))
            .then_effects(|effects| assertions::assert_no_timers(effects))
            .run();
    }

    #[tokio::test]
    async fn test_deferred_timeout_waits_for_authorization() {
        let provider = MockPositionProvider::with_permission(ServiceState::NotDetermined);
        let (request, _pending) = single(1, AccuracyLevel::Block, 10);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(LocationState::new())
            .when_action(LocationAction::AddRequest {
                request,
                delay_until_authorized: true,
            })
            .then_state(|state| {
                assert!(state.request(RequestId::new(1)).is_some_and(|r| !r.is_armed()));
            })
            .then_effects(|effects| assertions::assert_no_timers(effects))
            .run();
    }

    #[tokio::test]
    async fn test_authorization_arms_deferred_timers() {
        let provider = MockPositionProvider::new();
        let (request, _pending) = single(1, AccuracyLevel::Block, 10);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::PermissionChanged(ServiceState::Available))
            .then_state(|state| {
                assert!(state.request(RequestId::new(1)).is_some_and(LocationRequest::is_armed));
            })
            .then_effects(|effects| assertions::assert_arms_timer(effects))
            .run();
    }

    #[tokio::test]
    async fn test_add_while_denied_completes_everything() {
        let provider = MockPositionProvider::with_permission(ServiceState::Denied);
        let (first, mut first_pending) = single(1, AccuracyLevel::Block, 0);
        let (second, mut second_pending) = single(2, AccuracyLevel::Room, 0);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![first]))
            .when_action(add(second))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 0);
                assert!(!state.provider.updating);
            })
            .run();

        for pending in [&mut first_pending, &mut second_pending] {
            let outcome = pending.try_outcome();
            assert_eq!(outcome.map(|o| o.status), Some(LocationStatus::ServicesDenied));
        }
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_completes_only_satisfied_requests() {
        let provider = MockPositionProvider::new();
        let clock = test_clock();
        let (block, mut block_pending) = single(1, AccuracyLevel::Block, 0);
        let (room, mut room_pending) = single(2, AccuracyLevel::Room, 0);
        let fix = Location::new(51.5, -0.12, 50.0, clock.now());

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![block, room]))
            .when_action(LocationAction::LocationUpdated(fix))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 1);
                assert!(state.request(RequestId::new(2)).is_some());
                assert!(state.current_location.is_some());
                assert_eq!(state.provider.desired_accuracy, Some(AccuracyLevel::Room));
            })
            .run();

        let outcome = block_pending.try_outcome();
        assert_eq!(outcome.as_ref().map(|o| o.status), Some(LocationStatus::Success));
        assert_eq!(outcome.map(|o| o.achieved_accuracy), Some(AccuracyLevel::Block));
        assert!(room_pending.try_outcome().is_none());
    }

    #[tokio::test]
    async fn test_stale_update_does_not_complete() {
        let provider = MockPositionProvider::new();
        let clock = test_clock();
        let (request, mut pending) = single(1, AccuracyLevel::Block, 0);
        let stale = Location::new(51.5, -0.12, 10.0, clock.seconds_ago(120));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::LocationUpdated(stale))
            .then_state(|state| assert_eq!(state.pending_count(), 1))
            .run();

        assert!(pending.try_outcome().is_none());
    }

    #[tokio::test]
    async fn test_timeout_uses_last_known_location() {
        let provider = MockPositionProvider::new();
        let clock = test_clock();
        provider.set_last_known_location(Some(Location::new(1.0, 2.0, 80.0, clock.now())));
        let (mut request, mut pending) = single(1, AccuracyLevel::Room, 5);
        let _ = request.start_timeout_timer_if_needed();

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::TimeoutFired { id: RequestId::new(1) })
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .run();

        let outcome = pending.try_outcome();
        assert_eq!(outcome.as_ref().map(|o| o.status), Some(LocationStatus::TimedOut));
        assert_eq!(outcome.as_ref().map(|o| o.achieved_accuracy), Some(AccuracyLevel::Block));
        assert!(outcome.is_some_and(|o| o.location.is_some()));
    }

    #[tokio::test]
    async fn test_timeout_for_unknown_request_is_ignored() {
        let provider = MockPositionProvider::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(LocationState::new())
            .when_action(LocationAction::TimeoutFired { id: RequestId::new(9) })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[tokio::test]
    async fn test_cancel_stops_timer() {
        let provider = MockPositionProvider::new();
        let (mut request, _pending) = single(3, AccuracyLevel::Room, 5);
        let timer = request.timer_id();
        let _ = request.start_timeout_timer_if_needed();

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::Cancel { id: RequestId::new(3) })
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .then_effects(move |effects| assertions::assert_cancels(effects, timer))
            .run();
    }

    #[tokio::test]
    async fn test_force_complete_subscription_ends_stream() {
        let provider = MockPositionProvider::new();
        let (request, mut subscription) =
            LocationRequest::subscription(RequestId::new(4), AccuracyLevel::House);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::ForceComplete { id: RequestId::new(4) })
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .run();

        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_completes_everything() {
        let provider = MockPositionProvider::new();
        let (single_request, mut pending) = single(1, AccuracyLevel::Room, 0);
        let (subscription, mut updates) =
            LocationRequest::subscription(RequestId::new(2), AccuracyLevel::City);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![single_request, subscription]))
            .when_action(LocationAction::ProviderFailed {
                message: "gps off".to_string(),
            })
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .run();

        assert_eq!(pending.try_outcome().map(|o| o.status), Some(LocationStatus::Error));
        assert_eq!(updates.next().await.map(|o| o.status), Some(LocationStatus::Error));
        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn test_significant_changes_do_not_affect_accuracy() {
        let provider = MockPositionProvider::new();
        let (request, _subscription) = LocationRequest::significant_changes(RequestId::new(1));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(LocationState::new())
            .when_action(add(request))
            .then_state(|state| {
                assert!(state.provider.monitoring_significant_changes);
                assert!(!state.provider.updating);
                assert_eq!(state.provider.desired_accuracy, None);
            })
            .run();

        assert_eq!(provider.calls(), vec![PositionCall::StartSignificantChanges]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_removed() {
        let provider = MockPositionProvider::new();
        let (request, subscription) =
            LocationRequest::subscription(RequestId::new(1), AccuracyLevel::Room);
        drop(subscription);
        let fix = Location::new(0.0, 0.0, 3.0, test_clock().now());

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::LocationUpdated(fix))
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .run();
    }

    #[tokio::test]
    async fn test_dropped_handle_is_pruned_on_next_action() {
        let provider = MockPositionProvider::new();
        let (mut request, pending) = single(1, AccuracyLevel::Room, 5);
        let timer = request.timer_id();
        let _ = request.start_timeout_timer_if_needed();
        let (forever, forever_pending) = single(2, AccuracyLevel::City, 0);
        drop(pending);
        drop(forever_pending);

        let mut state = state_with(vec![request, forever]);
        state.provider.updating = true;
        state.provider.desired_accuracy = Some(AccuracyLevel::Room);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state)
            .when_action(LocationAction::Cancel { id: RequestId::new(99) })
            .then_state(|state| {
                assert_eq!(state.pending_count(), 0);
                assert!(!state.provider.updating);
            })
            .then_effects(move |effects| assertions::assert_cancels(effects, timer))
            .run();

        assert_eq!(provider.calls(), vec![PositionCall::StopUpdating]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_without_delivery() {
        let provider = MockPositionProvider::new();
        let (request, pending) = single(1, AccuracyLevel::Room, 0);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(LocationAction::Shutdown)
            .then_state(|state| assert_eq!(state.pending_count(), 0))
            .run();

        assert!(pending.outcome().await.is_none());
    }
}
