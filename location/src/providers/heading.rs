//! Heading provider trait.

use crate::state::Heading;
use tokio::sync::mpsc;

/// Something that happened at the heading provider.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadingEvent {
    /// A new reading.
    Updated(Heading),
    /// The provider failed; every subscriber should be told.
    Failed(String),
}

/// The device's compass.
pub trait HeadingProvider: Send + Sync {
    /// Begin heading updates.
    fn start(&self);

    /// Stop heading updates.
    fn stop(&self);

    /// Minimum change in degrees before a new reading is reported.
    fn set_filter_accuracy(&self, degrees: f64);

    /// Whether the device can report headings at all.
    fn is_available(&self) -> bool;

    /// Deliver every later event to `events`, in order, until its receiver
    /// is dropped.
    fn subscribe(&self, events: mpsc::UnboundedSender<HeadingEvent>);
}
