//! Provider traits for the location and heading hardware.
//!
//! Providers are controlled synchronously from inside the reducers and report
//! back asynchronously on an unbounded `tokio::sync::mpsc` sender owned by
//! the manager, so no event is ever skipped. Control calls must be
//! idempotent.

mod heading;
mod position;

pub use heading::{HeadingEvent, HeadingProvider};
pub use position::{PositionEvent, PositionProvider};
