//! Position provider trait.

use crate::accuracy::AccuracyLevel;
use crate::state::{Location, ServiceState};
use tokio::sync::mpsc;

/// Something that happened at the position provider.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// A new fix.
    Updated(Location),
    /// The provider failed; every request should be told.
    Failed(String),
    /// Authorization changed.
    PermissionChanged(ServiceState),
}

/// The device's position source.
///
/// # Example
///
/// ```ignore
/// impl PositionProvider for GpsdProvider {
///     fn start_updating(&self) {
///         self.client.watch(true);
///     }
///     // ...
///     fn subscribe(&self, events: mpsc::UnboundedSender<PositionEvent>) {
///         self.listeners.lock().push(events);
///     }
/// }
/// ```
pub trait PositionProvider: Send + Sync {
    /// Begin continuous updates.
    fn start_updating(&self);

    /// Stop continuous updates.
    fn stop_updating(&self);

    /// Begin low-power significant-change monitoring.
    fn start_monitoring_significant_changes(&self);

    /// Stop significant-change monitoring.
    fn stop_monitoring_significant_changes(&self);

    /// Configure how precise continuous updates should be.
    fn set_desired_accuracy(&self, level: AccuracyLevel);

    /// The last fix the provider knows about, possibly from before startup.
    fn last_known_location(&self) -> Option<Location>;

    /// Current authorization state.
    fn permission_state(&self) -> ServiceState;

    /// Deliver every later event to `events`, in order, until its receiver
    /// is dropped.
    ///
    /// Events must never be skipped: a lost `PermissionChanged` or `Failed`
    /// would leave requests waiting forever.
    fn subscribe(&self, events: mpsc::UnboundedSender<PositionEvent>);
}
