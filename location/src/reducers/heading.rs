//! Heading subscription reducer.
//!
//! Heading subscriptions never time out, so this reducer never produces
//! effects. It only keeps the registry and starts or stops the compass.

use crate::actions::HeadingAction;
use crate::environment::HeadingEnvironment;
use crate::id::RequestId;
use crate::providers::HeadingProvider;
use crate::request::HeadingRequest;
use crate::state::{Heading, HeadingOutcome, HeadingState, HeadingStatus};
use geoplex_core::effect::Effect;
use geoplex_core::reducer::Reducer;
use geoplex_core::{smallvec, SmallVec};
use std::marker::PhantomData;

/// Heading subscription reducer.
#[derive(Debug, Clone)]
pub struct HeadingReducer<H> {
    _phantom: PhantomData<H>,
}

impl<H> HeadingReducer<H> {
    /// Create a new heading reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<H> Default for HeadingReducer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> HeadingReducer<H>
where
    H: HeadingProvider + Clone,
{
    fn subscribe(state: &mut HeadingState, mut request: HeadingRequest, env: &HeadingEnvironment<H>) {
        let id = request.id();

        if !env.provider.is_available() {
            tracing::debug!(request_id = %id, "Heading unavailable, rejecting subscription");
            request.complete(HeadingOutcome::unavailable());
            return;
        }

        tracing::debug!(request_id = %id, "Heading subscription added");
        metrics::counter!("heading.requests.created").increment(1);
        state.requests.insert(id, request);
    }

    fn cancel(state: &mut HeadingState, id: RequestId) {
        match state.requests.remove(&id) {
            Some(mut request) => {
                tracing::debug!(request_id = %id, "Heading subscription cancelled");
                request.cancel();
            },
            None => tracing::debug!(request_id = %id, "Cancel for unknown heading subscription ignored"),
        }
    }

    fn heading_updated(state: &mut HeadingState, heading: Heading) {
        let outcome = HeadingOutcome::from_heading(heading.clone());
        if outcome.status == HeadingStatus::Invalid {
            tracing::trace!(accuracy = heading.heading_accuracy, "Invalid heading reading");
        }

        state.requests.retain(|id, request| {
            let delivered = request.notify(outcome.clone());
            if !delivered {
                tracing::debug!(request_id = %id, "Heading subscriber dropped, removing subscription");
            }
            delivered
        });
        state.current_heading = Some(heading);
    }

    fn complete_all(state: &mut HeadingState) {
        for (_, mut request) in std::mem::take(&mut state.requests) {
            request.complete(HeadingOutcome::unavailable());
        }
    }

    /// Start the compass on the first subscription, stop it after the last.
    fn arbitrate(state: &mut HeadingState, env: &HeadingEnvironment<H>) {
        let wanted = !state.requests.is_empty();
        if wanted == state.updating {
            return;
        }

        if wanted {
            tracing::info!(filter_degrees = env.filter_degrees, "Starting heading updates");
            env.provider.set_filter_accuracy(env.filter_degrees);
            env.provider.start();
        } else {
            tracing::info!("Stopping heading updates");
            env.provider.stop();
        }
        state.updating = wanted;
    }
}

impl<H> Reducer for HeadingReducer<H>
where
    H: HeadingProvider + Clone,
{
    type State = HeadingState;
    type Action = HeadingAction;
    type Environment = HeadingEnvironment<H>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            HeadingAction::Subscribe(request) => Self::subscribe(state, request, env),
            HeadingAction::Cancel { id } => Self::cancel(state, id),
            HeadingAction::Shutdown => {
                tracing::info!(pending = state.requests.len(), "Cancelling all heading subscriptions");
                for (_, mut request) in std::mem::take(&mut state.requests) {
                    request.cancel();
                }
            },
            HeadingAction::HeadingUpdated(heading) => Self::heading_updated(state, heading),
            HeadingAction::ProviderFailed { message } => {
                tracing::warn!(%message, "Heading provider failed, completing all subscriptions");
                Self::complete_all(state);
            },
        }

        state.requests.retain(|id, request| {
            let abandoned = request.is_abandoned();
            if abandoned {
                tracing::debug!(request_id = %id, "Stream dropped, removing heading subscription");
            }
            !abandoned
        });
        Self::arbitrate(state, env);
        smallvec![Effect::None]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{HeadingCall, MockHeadingProvider};
    use geoplex_core::environment::Clock;
    use geoplex_testing::{assertions, test_clock, ReducerTest};

    type TestReducer = HeadingReducer<MockHeadingProvider>;

    fn env(provider: &MockHeadingProvider) -> HeadingEnvironment<MockHeadingProvider> {
        HeadingEnvironment::new(provider.clone(), 2.0)
    }

    fn state_with(requests: Vec<HeadingRequest>) -> HeadingState {
        let mut state = HeadingState::new();
        for request in requests {
            state.requests.insert(request.id(), request);
        }
        state.updating = !state.requests.is_empty();
        state
    }

    #[tokio::test]
    async fn test_first_subscription_starts_provider() {
        let provider = MockHeadingProvider::new();
        let (request, _subscription) = HeadingRequest::new(RequestId::new(1));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(HeadingState::new())
            .when_action(HeadingAction::Subscribe(request))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 1);
                assert!(state.updating);
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();

        assert_eq!(
            provider.calls(),
            vec![HeadingCall::SetFilterAccuracy(2.0), HeadingCall::Start]
        );
    }

    #[tokio::test]
    async fn test_unavailable_rejects_subscription() {
        let provider = MockHeadingProvider::with_availability(false);
        let (request, mut subscription) = HeadingRequest::new(RequestId::new(1));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(HeadingState::new())
            .when_action(HeadingAction::Subscribe(request))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 0);
                assert!(!state.updating);
            })
            .run();

        assert_eq!(
            subscription.next().await.map(|o| o.status),
            Some(HeadingStatus::Unavailable)
        );
        assert!(subscription.next().await.is_none());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_reaches_every_subscriber() {
        let provider = MockHeadingProvider::new();
        let (first, mut first_sub) = HeadingRequest::new(RequestId::new(1));
        let (second, mut second_sub) = HeadingRequest::new(RequestId::new(2));
        let reading = Heading::new(180.0, 182.0, -1.0, test_clock().now());

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![first, second]))
            .when_action(HeadingAction::HeadingUpdated(reading))
            .then_state(|state| {
                assert_eq!(state.pending_count(), 2);
                assert!(state.current_heading.is_some());
            })
            .run();

        for subscription in [&mut first_sub, &mut second_sub] {
            assert_eq!(
                subscription.try_next().map(|o| o.status),
                Some(HeadingStatus::Invalid)
            );
        }
    }

    #[tokio::test]
    async fn test_failure_clears_registry_and_stops() {
        let provider = MockHeadingProvider::new();
        let (request, mut subscription) = HeadingRequest::new(RequestId::new(1));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(HeadingAction::ProviderFailed {
                message: "magnetometer error".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.pending_count(), 0);
                assert!(!state.updating);
            })
            .run();

        assert_eq!(
            subscription.next().await.map(|o| o.status),
            Some(HeadingStatus::Unavailable)
        );
        assert!(subscription.next().await.is_none());
        assert_eq!(provider.calls(), vec![HeadingCall::Stop]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let provider = MockHeadingProvider::new();
        let (request, _subscription) = HeadingRequest::new(RequestId::new(1));

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(HeadingAction::Cancel { id: RequestId::new(7) })
            .then_state(|state| assert_eq!(state.pending_count(), 1))
            .run();

        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_compass() {
        let provider = MockHeadingProvider::new();
        let (request, subscription) = HeadingRequest::new(RequestId::new(1));
        drop(subscription);

        ReducerTest::new(TestReducer::new())
            .with_env(env(&provider))
            .given_state(state_with(vec![request]))
            .when_action(HeadingAction::Cancel { id: RequestId::new(7) })
            .then_state(|state| {
                assert_eq!(state.pending_count(), 0);
                assert!(!state.updating);
            })
            .run();

        assert_eq!(provider.calls(), vec![HeadingCall::Stop]);
    }
}
