//! Mock provider implementations for testing.
//!
//! In-memory providers that record every control call and let tests push
//! events, for use in unit and integration tests.

pub mod heading;
pub mod position;

pub use heading::{HeadingCall, MockHeadingProvider};
pub use position::{MockPositionProvider, PositionCall};
