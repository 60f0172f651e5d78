//! # Geoplex Runtime
//!
//! Runtime implementation for the geoplex reducer architecture.
//!
//! This crate provides the [`Store`]: the single serialisation domain in
//! which a reducer runs, plus the executor that turns returned effects into
//! spawned tasks whose results are fed back as actions.
//!
//! ## Core Components
//!
//! - **Store**: Owns state behind one lock and runs the reducer for every action
//! - **Timer Executor**: Spawns `Effect::Delay` timers and feeds their actions back
//! - **Cancellation**: a running timer is aborted by `Effect::Cancel` with its id
//!
//! ## Example
//!
//! ```ignore
//! use geoplex_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use geoplex_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;

/// Configuration for Store behavior
///
/// # Example
///
/// ```
/// use geoplex_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default().with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.default_shutdown_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(default_shutdown_timeout: Duration) -> Self {
        Self {
            default_shutdown_timeout,
        }
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Releases a running timer's slot in the store's pending count on drop
///
/// Created before spawning so that a timer aborted before its first poll
/// still releases its slot.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Abort handles of running timers, keyed by effect id
type Timers = Arc<Mutex<HashMap<EffectId, AbortHandle>>>;

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        AbortHandle, Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectId, HashMap, Mutex,
        Ordering, PendingGuard, PoisonError, Reducer, RwLock, StoreConfig, StoreError, Timers,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; every reducer run holds the write lock)
    /// 2. Reducer (request lifecycle logic)
    /// 3. Environment (injected collaborators)
    /// 4. Timers (with feedback loop and cancellation)
    ///
    /// Because every action goes through the same write lock, the store is the
    /// serialisation domain for its state: public calls, provider events and
    /// timer fires never interleave inside a reducer.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        timers: Timers,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`].
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                timers: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        /// Access the injected environment
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Number of timers currently armed
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Whether shutdown has been initiated
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown using the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`Store::shutdown`].
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.config.default_shutdown_timeout).await
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Aborts every armed timer
        /// 3. Waits for timers already feeding an action back (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            // Set shutdown flag to reject new actions
            self.shutdown.store(true, Ordering::Release);

            let aborted: Vec<AbortHandle> = self
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .map(|(_, handle)| handle)
                .collect();
            if !aborted.is_empty() {
                tracing::debug!(count = aborted.len(), "Aborting armed timers");
            }
            for handle in aborted {
                handle.abort();
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Arms or cancels the timers the reducer returned
        ///
        /// `send()` returns once the reducer has run and its effects have been
        /// applied, never waiting for a timer to fire.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Panics
        ///
        /// If the reducer panics, the panic will propagate to the caller.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect);
            }

            Ok(())
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let pending = store.state(|s| s.requests.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Execute one effect, in the order the reducer returned it
        ///
        /// - `None`: No-op
        /// - `Delay`: Arms a timer registered under its id
        /// - `Cancel`: Aborts the timer registered under its id
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Delay {
                    id,
                    duration,
                    action,
                } => {
                    tracing::trace!(%id, "Arming timer ({:?})", duration);
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    self.spawn_timer(id, duration, *action);
                },
                Effect::Cancel(id) => {
                    let handle = self
                        .timers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);

                    if let Some(handle) = handle {
                        tracing::trace!(%id, "Cancelling timer");
                        metrics::counter!("store.effects.cancelled").increment(1);
                        handle.abort();
                    } else {
                        tracing::trace!(%id, "Nothing to cancel (already fired)");
                    }
                },
            }
        }

        /// Spawn a timer that feeds `action` back unless aborted first
        ///
        /// The abort handle is registered before the task can observe the map,
        /// and the task unregisters itself before feeding its action back.
        fn spawn_timer(&self, id: EffectId, duration: Duration, action: A) {
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = PendingGuard(Arc::clone(&self.pending_effects));
            let store = self.clone();

            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);

            let task = tokio::spawn(async move {
                let _guard = guard;

                tokio::time::sleep(duration).await;
                store
                    .timers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);

                tracing::trace!(%id, "Timer fired, sending to store");
                if store.send(action).await.is_err() {
                    tracing::debug!(%id, "Timer fired after shutdown, action dropped");
                }
            });

            if let Some(previous) = timers.insert(id, task.abort_handle()) {
                tracing::debug!(%id, "Replacing timer with the same id");
                previous.abort();
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                timers: Arc::clone(&self.timers),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use geoplex_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ArmTimer(u64),
        DisarmTimer(u64),
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::NoOp => smallvec![Effect::None],
                TestAction::ArmTimer(id) => smallvec![Effect::delay(
                    EffectId::new(id),
                    Duration::from_secs(5),
                    TestAction::Increment,
                )],
                TestAction::DisarmTimer(id) => smallvec![Effect::Cancel(EffectId::new(id))],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = store();

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_multiple_actions() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::Increment).await?;
        store.send(TestAction::Increment).await?;
        store.send(TestAction::Decrement).await?;
        store.send(TestAction::NoOp).await?;

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic)] // Tests are allowed to panic on failures
    async fn test_concurrent_sends() {
        let store = store();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(TestAction::Increment).await;
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                panic!("concurrent send task panicked: {e}");
            }
        }

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::ArmTimer(1)).await?;
        assert_eq!(store.pending_effects(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(store.pending_effects(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_armed_timer() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::ArmTimer(1)).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.send(TestAction::DisarmTimer(1)).await?;

        tokio::time::sleep(Duration::from_secs(10)).await;

        // The aborted task still releases its slot
        assert_eq!(store.state(|s| s.value).await, 0);
        assert_eq!(store.pending_effects(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_timer() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::ArmTimer(1)).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        store.send(TestAction::ArmTimer(1)).await?;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_unknown_timer_is_noop() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::DisarmTimer(99)).await?;

        assert_eq!(store.state(|s| s.value).await, 0);
        assert_eq!(store.pending_effects(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_timers_and_rejects_actions() -> Result<(), StoreError> {
        let store = store();

        store.send(TestAction::ArmTimer(1)).await?;
        store.send(TestAction::ArmTimer(2)).await?;

        store.shutdown(Duration::from_secs(1)).await?;
        assert!(store.is_shutting_down());
        assert_eq!(store.pending_effects(), 0);

        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.state(|s| s.value).await, 0);
        Ok(())
    }
}
