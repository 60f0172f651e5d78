//! # Geoplex Core
//!
//! Core traits and types shared by every geoplex crate.
//!
//! Request multiplexing is modelled as a state machine driven by actions:
//!
//! - **State**: the registry of outstanding requests and provider configuration
//! - **Action**: every input (public API calls, provider events, timer fires)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of deferred work (timers), executed by the runtime
//! - **Environment**: injected collaborators (providers, clock)
//!
//! ## Example
//!
//! ```ignore
//! use geoplex_core::*;
//!
//! impl Reducer for LocationReducer {
//!     type State = LocationState;
//!     type Action = LocationAction;
//!     type Environment = LocationEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut LocationState,
//!         action: LocationAction,
//!         env: &LocationEnvironment,
//!     ) -> SmallVec<[Effect<LocationAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - The core trait for state transitions
///
/// Reducers are functions `(State, Action, Environment) → (State, Effects)`.
/// They run one at a time inside the store's serialisation domain, so a
/// reducer never has to think about concurrent mutation of its state.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for request lifecycle logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned from reducers and executed by the runtime.
/// The only deferred work a reducer asks for is a timer: an action fed back
/// into the reducer after a delay unless it is cancelled first.
pub mod effect {
    use std::time::Duration;

    /// Identifier for a timer
    ///
    /// Scoped to a single store: two stores may reuse the same identifier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct EffectId(u64);

    impl EffectId {
        /// Create an effect identifier from a raw value
        #[must_use]
        pub const fn new(value: u64) -> Self {
            Self(value)
        }

        /// Raw identifier value
        #[must_use]
        pub const fn get(self) -> u64 {
            self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "effect-{}", self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    #[derive(Debug)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Dispatch `action` after `duration` unless cancelled first
        ///
        /// Arming a delay under an id that is still running replaces the
        /// earlier one.
        Delay {
            /// Identifier used to cancel the delay
            id: EffectId,
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Abort a running [`Effect::Delay`]
        ///
        /// Cancelling an identifier that already fired (or never existed)
        /// is a no-op.
        Cancel(EffectId),
    }

    impl<Action> Effect<Action> {
        /// Dispatch `action` after `duration`, abortable through `id`
        #[must_use]
        pub fn delay(id: EffectId, duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                id,
                duration,
                action: Box::new(action),
            }
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use geoplex_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
