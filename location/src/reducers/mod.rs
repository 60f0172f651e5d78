//! Location and heading reducers.
//!
//! Reducers are functions: `(State, Action, Environment) → (State, Effects)`.
//! The only side effects they perform directly are the synchronous provider
//! control calls; timers are returned as effects.

pub mod heading;
pub mod location;

// Re-export
pub use heading::HeadingReducer;
pub use location::LocationReducer;
