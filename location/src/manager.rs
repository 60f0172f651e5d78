//! Location and heading managers.
//!
//! A manager is a [`Store`] around one of the reducers plus a task that
//! forwards provider events into that store. Every public call, provider
//! event and timer fire runs under the store's write lock, one at a time.
//!
//! Managers are plain values: build as many as needed, typically one
//! [`LocationServices`] per process. All constructors must run inside a
//! Tokio runtime.
//!
//! Prefer calling `shutdown()` before dropping a manager. A manager dropped
//! without it releases its requests and stops its provider from a detached
//! task, which only works while the runtime is still alive.

use crate::accuracy::AccuracyLevel;
use crate::actions::{HeadingAction, LocationAction};
use crate::config::LocationConfig;
use crate::environment::{HeadingEnvironment, LocationEnvironment};
use crate::error::{ConfigError, LocationError, Result};
use crate::handle::{HeadingSubscription, LocationSubscription, PendingLocation};
use crate::id::{RequestId, RequestIdAllocator};
use crate::providers::{HeadingEvent, HeadingProvider, PositionEvent, PositionProvider};
use crate::reducers::{HeadingReducer, LocationReducer};
use crate::request::{HeadingRequest, LocationRequest};
use crate::state::{HeadingServiceState, HeadingState, LocationState, ServiceState};
use geoplex_core::environment::{Clock, SystemClock};
use geoplex_core::reducer::Reducer;
use geoplex_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type LocationStore<P, C> =
    Store<LocationState, LocationAction, LocationEnvironment<P, C>, LocationReducer<P, C>>;

type HeadingStore<H> = Store<HeadingState, HeadingAction, HeadingEnvironment<H>, HeadingReducer<H>>;

/// Forward every provider event into `store` until either side goes away.
fn spawn_event_pump<S, A, E, R, Ev>(
    store: Store<S, A, E, R>,
    mut events: mpsc::UnboundedReceiver<Ev>,
    source: &'static str,
) -> JoinHandle<()>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: From<Ev> + Send + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Ev: Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if store.send(A::from(event)).await.is_err() {
                tracing::debug!(source, "Store shut down, stopping event pump");
                return;
            }
        }
        tracing::debug!(source, "Provider event stream closed");
    })
}

/// Best-effort teardown for a manager dropped without `shutdown()`.
///
/// Sends `action` from a detached task so outstanding requests are released
/// and the provider is stopped. Outside a runtime nothing can be sent and the
/// provider is left as is.
fn shutdown_detached<S, A, E, R>(store: &Store<S, A, E, R>, action: A, source: &'static str)
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    if store.is_shutting_down() {
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(source, "Manager dropped outside a runtime, provider left running");
        return;
    };
    let store = store.clone();
    runtime.spawn(async move {
        if store.send(action).await.is_err() {
            return;
        }
        if let Err(error) = store.shutdown_default().await {
            tracing::debug!(source, %error, "Dropped manager did not shut down cleanly");
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════
// Location
// ═══════════════════════════════════════════════════════════════════════

/// Multiplexes location requests over one [`PositionProvider`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = LocationManager::new(provider, &LocationConfig::default())?;
/// let pending = manager
///     .request_location(AccuracyLevel::House, Duration::from_secs(10), false)
///     .await?;
/// let outcome = pending.outcome().await;
/// ```
pub struct LocationManager<P, C = SystemClock>
where
    P: PositionProvider + Clone + 'static,
    C: Clock + Clone + 'static,
{
    store: LocationStore<P, C>,
    ids: Arc<RequestIdAllocator>,
    default_subscription_accuracy: AccuracyLevel,
    event_pump: JoinHandle<()>,
}

impl<P> LocationManager<P, SystemClock>
where
    P: PositionProvider + Clone + 'static,
{
    /// Create a manager using the system clock and its own id allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(provider: P, config: &LocationConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_clock(provider, SystemClock, config, Arc::new(RequestIdAllocator::new()))
    }
}

impl<P, C> LocationManager<P, C>
where
    P: PositionProvider + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Create a manager with an explicit clock and a shared id allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_clock(
        provider: P,
        clock: C,
        config: &LocationConfig,
        ids: Arc<RequestIdAllocator>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let (events_tx, events) = mpsc::unbounded_channel();
        provider.subscribe(events_tx);
        let store: LocationStore<P, C> = Store::with_config(
            LocationState::new(),
            LocationReducer::new(),
            LocationEnvironment::new(provider, clock),
            config.store.clone(),
        );
        let event_pump = spawn_event_pump(store.clone(), events, "position");

        Ok(Self {
            store,
            ids,
            default_subscription_accuracy: config.default_subscription_accuracy,
            event_pump,
        })
    }

    /// Ask for one location at least as precise as `desired`.
    ///
    /// A zero `timeout` never times out. With `delay_until_authorized` the
    /// timeout only starts once the provider reports
    /// [`ServiceState::Available`].
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidAccuracy`] for [`AccuracyLevel::None`]
    /// and [`LocationError::Store`] after shutdown.
    pub async fn request_location(
        &self,
        desired: AccuracyLevel,
        timeout: Duration,
        delay_until_authorized: bool,
    ) -> Result<PendingLocation> {
        if !desired.is_requestable() {
            return Err(LocationError::InvalidAccuracy(desired));
        }

        let (request, pending) = LocationRequest::single(self.ids.next_id(), desired, timeout);
        self.store
            .send(LocationAction::AddRequest {
                request,
                delay_until_authorized,
            })
            .await?;
        Ok(pending)
    }

    /// Receive every continuous update until cancelled.
    ///
    /// `None` uses the configured default accuracy. The subscription never
    /// times out and receives updates regardless of their accuracy.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidAccuracy`] for
    /// `Some(AccuracyLevel::None)` and [`LocationError::Store`] after shutdown.
    pub async fn subscribe_to_location_updates(
        &self,
        desired: Option<AccuracyLevel>,
    ) -> Result<LocationSubscription> {
        let desired = desired.unwrap_or(self.default_subscription_accuracy);
        if !desired.is_requestable() {
            return Err(LocationError::InvalidAccuracy(desired));
        }

        let (request, subscription) = LocationRequest::subscription(self.ids.next_id(), desired);
        self.add(request).await?;
        Ok(subscription)
    }

    /// Receive significant-change updates until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn subscribe_to_significant_location_changes(&self) -> Result<LocationSubscription> {
        let (request, subscription) = LocationRequest::significant_changes(self.ids.next_id());
        self.add(request).await?;
        Ok(subscription)
    }

    async fn add(&self, request: LocationRequest) -> Result<()> {
        self.store
            .send(LocationAction::AddRequest {
                request,
                delay_until_authorized: false,
            })
            .await?;
        Ok(())
    }

    /// Complete a request now.
    ///
    /// A single request times out with the most recent known location; a
    /// subscription simply ends. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn force_complete_location_request(&self, id: RequestId) -> Result<()> {
        self.store.send(LocationAction::ForceComplete { id }).await?;
        Ok(())
    }

    /// Cancel a request without delivering anything. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn cancel_location_request(&self, id: RequestId) -> Result<()> {
        self.store.send(LocationAction::Cancel { id }).await?;
        Ok(())
    }

    /// Feed a provider event in directly.
    ///
    /// Events the provider reports are forwarded automatically; this is
    /// for adapters that receive events some other way.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn process_event(&self, event: PositionEvent) -> Result<()> {
        self.store.send(LocationAction::from(event)).await?;
        Ok(())
    }

    /// The provider's authorization state.
    #[must_use]
    pub fn location_services_state(&self) -> ServiceState {
        self.store.environment().provider.permission_state()
    }

    /// Number of outstanding requests and subscriptions.
    pub async fn pending_request_count(&self) -> usize {
        self.store.state(LocationState::pending_count).await
    }

    /// Read the manager's state.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&LocationState) -> T,
    {
        self.store.state(f).await
    }

    /// Cancel every request, stop the provider and wait for running effects.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] if effects outlive the configured
    /// shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        if self.store.is_shutting_down() {
            return Ok(());
        }
        self.event_pump.abort();
        self.store.send(LocationAction::Shutdown).await?;
        self.store.shutdown_default().await?;
        Ok(())
    }
}

impl<P, C> Drop for LocationManager<P, C>
where
    P: PositionProvider + Clone + 'static,
    C: Clock + Clone + 'static,
{
    fn drop(&mut self) {
        self.event_pump.abort();
        shutdown_detached(&self.store, LocationAction::Shutdown, "position");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Heading
// ═══════════════════════════════════════════════════════════════════════

/// Multiplexes heading subscriptions over one [`HeadingProvider`].
pub struct HeadingManager<H>
where
    H: HeadingProvider + Clone + 'static,
{
    store: HeadingStore<H>,
    ids: Arc<RequestIdAllocator>,
    event_pump: JoinHandle<()>,
}

impl<H> HeadingManager<H>
where
    H: HeadingProvider + Clone + 'static,
{
    /// Create a manager with its own id allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(provider: H, config: &LocationConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_ids(provider, config, Arc::new(RequestIdAllocator::new()))
    }

    /// Create a manager drawing ids from a shared allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_ids(
        provider: H,
        config: &LocationConfig,
        ids: Arc<RequestIdAllocator>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let (events_tx, events) = mpsc::unbounded_channel();
        provider.subscribe(events_tx);
        let store: HeadingStore<H> = Store::with_config(
            HeadingState::new(),
            HeadingReducer::new(),
            HeadingEnvironment::new(provider, config.heading_filter_degrees),
            config.store.clone(),
        );
        let event_pump = spawn_event_pump(store.clone(), events, "heading");

        Ok(Self {
            store,
            ids,
            event_pump,
        })
    }

    /// Receive heading readings until cancelled.
    ///
    /// If the device has no usable compass the subscription receives a single
    /// [`crate::HeadingStatus::Unavailable`] outcome and ends.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn subscribe_to_heading_updates(&self) -> Result<HeadingSubscription> {
        let (request, subscription) = HeadingRequest::new(self.ids.next_id());
        self.store.send(HeadingAction::Subscribe(request)).await?;
        Ok(subscription)
    }

    /// Cancel a subscription. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn cancel_heading_request(&self, id: RequestId) -> Result<()> {
        self.store.send(HeadingAction::Cancel { id }).await?;
        Ok(())
    }

    /// Feed a provider event in directly.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] after shutdown.
    pub async fn process_event(&self, event: HeadingEvent) -> Result<()> {
        self.store.send(HeadingAction::from(event)).await?;
        Ok(())
    }

    /// Whether the device can report headings.
    #[must_use]
    pub fn heading_services_state(&self) -> HeadingServiceState {
        if self.store.environment().provider.is_available() {
            HeadingServiceState::Available
        } else {
            HeadingServiceState::Unavailable
        }
    }

    /// Number of active subscriptions.
    pub async fn pending_request_count(&self) -> usize {
        self.store.state(HeadingState::pending_count).await
    }

    /// Read the manager's state.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&HeadingState) -> T,
    {
        self.store.state(f).await
    }

    /// Cancel every subscription, stop the provider and wait for running effects.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Store`] if effects outlive the configured
    /// shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        if self.store.is_shutting_down() {
            return Ok(());
        }
        self.event_pump.abort();
        self.store.send(HeadingAction::Shutdown).await?;
        self.store.shutdown_default().await?;
        Ok(())
    }
}

impl<H> Drop for HeadingManager<H>
where
    H: HeadingProvider + Clone + 'static,
{
    fn drop(&mut self) {
        self.event_pump.abort();
        shutdown_detached(&self.store, HeadingAction::Shutdown, "heading");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════

/// One location manager and one heading manager sharing an id allocator.
///
/// # Example
///
/// ```rust,ignore
/// let services = LocationServices::new(gps, compass, LocationConfig::from_env()?)?;
///
/// let mut headings = services.subscribe_to_heading_updates().await?;
/// while let Some(outcome) = headings.next().await {
///     println!("{:?}", outcome.heading);
/// }
/// ```
pub struct LocationServices<P, H, C = SystemClock>
where
    P: PositionProvider + Clone + 'static,
    H: HeadingProvider + Clone + 'static,
    C: Clock + Clone + 'static,
{
    location: LocationManager<P, C>,
    heading: HeadingManager<H>,
}

impl<P, H> LocationServices<P, H, SystemClock>
where
    P: PositionProvider + Clone + 'static,
    H: HeadingProvider + Clone + 'static,
{
    /// Build both managers using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(position: P, heading: H, config: LocationConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_clock(position, heading, SystemClock, config)
    }
}

impl<P, H, C> LocationServices<P, H, C>
where
    P: PositionProvider + Clone + 'static,
    H: HeadingProvider + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Build both managers with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_clock(
        position: P,
        heading: H,
        clock: C,
        config: LocationConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let ids = Arc::new(RequestIdAllocator::new());
        Ok(Self {
            location: LocationManager::with_clock(position, clock, &config, Arc::clone(&ids))?,
            heading: HeadingManager::with_ids(heading, &config, ids)?,
        })
    }

    /// The location manager.
    #[must_use]
    pub const fn location(&self) -> &LocationManager<P, C> {
        &self.location
    }

    /// The heading manager.
    #[must_use]
    pub const fn heading(&self) -> &HeadingManager<H> {
        &self.heading
    }

    /// See [`LocationManager::request_location`].
    ///
    /// # Errors
    ///
    /// See [`LocationManager::request_location`].
    pub async fn request_location(
        &self,
        desired: AccuracyLevel,
        timeout: Duration,
        delay_until_authorized: bool,
    ) -> Result<PendingLocation> {
        self.location
            .request_location(desired, timeout, delay_until_authorized)
            .await
    }

    /// See [`LocationManager::subscribe_to_location_updates`].
    ///
    /// # Errors
    ///
    /// See [`LocationManager::subscribe_to_location_updates`].
    pub async fn subscribe_to_location_updates(
        &self,
        desired: Option<AccuracyLevel>,
    ) -> Result<LocationSubscription> {
        self.location.subscribe_to_location_updates(desired).await
    }

    /// See [`LocationManager::subscribe_to_significant_location_changes`].
    ///
    /// # Errors
    ///
    /// See [`LocationManager::subscribe_to_significant_location_changes`].
    pub async fn subscribe_to_significant_location_changes(&self) -> Result<LocationSubscription> {
        self.location.subscribe_to_significant_location_changes().await
    }

    /// See [`LocationManager::force_complete_location_request`].
    ///
    /// # Errors
    ///
    /// See [`LocationManager::force_complete_location_request`].
    pub async fn force_complete_location_request(&self, id: RequestId) -> Result<()> {
        self.location.force_complete_location_request(id).await
    }

    /// See [`LocationManager::cancel_location_request`].
    ///
    /// # Errors
    ///
    /// See [`LocationManager::cancel_location_request`].
    pub async fn cancel_location_request(&self, id: RequestId) -> Result<()> {
        self.location.cancel_location_request(id).await
    }

    /// See [`HeadingManager::subscribe_to_heading_updates`].
    ///
    /// # Errors
    ///
    /// See [`HeadingManager::subscribe_to_heading_updates`].
    pub async fn subscribe_to_heading_updates(&self) -> Result<HeadingSubscription> {
        self.heading.subscribe_to_heading_updates().await
    }

    /// See [`HeadingManager::cancel_heading_request`].
    ///
    /// # Errors
    ///
    /// See [`HeadingManager::cancel_heading_request`].
    pub async fn cancel_heading_request(&self, id: RequestId) -> Result<()> {
        self.heading.cancel_heading_request(id).await
    }

    /// The position provider's authorization state.
    #[must_use]
    pub fn location_services_state(&self) -> ServiceState {
        self.location.location_services_state()
    }

    /// Whether the device can report headings.
    #[must_use]
    pub fn heading_services_state(&self) -> HeadingServiceState {
        self.heading.heading_services_state()
    }

    /// Shut down both managers.
    ///
    /// # Errors
    ///
    /// Returns the first error either manager reports; both are always
    /// shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let location = self.location.shutdown().await;
        let heading = self.heading.shutdown().await;
        location.and(heading)
    }
}
