//! Mock position provider for testing.

use crate::accuracy::AccuracyLevel;
use crate::providers::{PositionEvent, PositionProvider};
use crate::state::{Location, ServiceState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A control call received by [`MockPositionProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionCall {
    /// `start_updating`
    StartUpdating,
    /// `stop_updating`
    StopUpdating,
    /// `start_monitoring_significant_changes`
    StartSignificantChanges,
    /// `stop_monitoring_significant_changes`
    StopSignificantChanges,
    /// `set_desired_accuracy`
    SetDesiredAccuracy(AccuracyLevel),
}

#[derive(Debug)]
struct Inner {
    permission: ServiceState,
    last_known: Option<Location>,
    updating: bool,
    monitoring_significant_changes: bool,
    desired_accuracy: Option<AccuracyLevel>,
    calls: Vec<PositionCall>,
    listeners: Vec<mpsc::UnboundedSender<PositionEvent>>,
}

/// Mock position provider.
///
/// Clones share state, so a test can keep one clone while the manager owns
/// another.
#[derive(Debug, Clone)]
pub struct MockPositionProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MockPositionProvider {
    /// Create an authorized provider with no last known location.
    #[must_use]
    pub fn new() -> Self {
        Self::with_permission(ServiceState::Available)
    }

    /// Create a provider reporting `permission`.
    #[must_use]
    pub fn with_permission(permission: ServiceState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                permission,
                last_known: None,
                updating: false,
                monitoring_significant_changes: false,
                desired_accuracy: None,
                calls: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the reported permission without emitting an event.
    pub fn set_permission(&self, permission: ServiceState) {
        self.lock().permission = permission;
    }

    /// Change the location returned by `last_known_location`.
    pub fn set_last_known_location(&self, location: Option<Location>) {
        self.lock().last_known = location;
    }

    /// Deliver an event to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: PositionEvent) -> usize {
        if let PositionEvent::PermissionChanged(permission) = event {
            self.set_permission(permission);
        }
        let mut inner = self.lock();
        inner.listeners.retain(|listener| listener.send(event.clone()).is_ok());
        inner.listeners.len()
    }

    /// Whether continuous updates are running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.lock().updating
    }

    /// Whether significant-change monitoring is running.
    #[must_use]
    pub fn is_monitoring_significant_changes(&self) -> bool {
        self.lock().monitoring_significant_changes
    }

    /// Accuracy last passed to `set_desired_accuracy`.
    #[must_use]
    pub fn desired_accuracy(&self) -> Option<AccuracyLevel> {
        self.lock().desired_accuracy
    }

    /// Every control call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PositionCall> {
        self.lock().calls.clone()
    }

    /// How many times `call` was received.
    #[must_use]
    pub fn call_count(&self, call: PositionCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }
}

impl Default for MockPositionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionProvider for MockPositionProvider {
    fn start_updating(&self) {
        let mut inner = self.lock();
        inner.updating = true;
        inner.calls.push(PositionCall::StartUpdating);
    }

    fn stop_updating(&self) {
        let mut inner = self.lock();
        inner.updating = false;
        inner.calls.push(PositionCall::StopUpdating);
    }

    fn start_monitoring_significant_changes(&self) {
        let mut inner = self.lock();
        inner.monitoring_significant_changes = true;
        inner.calls.push(PositionCall::StartSignificantChanges);
    }

    fn stop_monitoring_significant_changes(&self) {
        let mut inner = self.lock();
        inner.monitoring_significant_changes = false;
        inner.calls.push(PositionCall::StopSignificantChanges);
    }

    fn set_desired_accuracy(&self, level: AccuracyLevel) {
        let mut inner = self.lock();
        inner.desired_accuracy = Some(level);
        inner.calls.push(PositionCall::SetDesiredAccuracy(level));
    }

    fn last_known_location(&self) -> Option<Location> {
        self.lock().last_known.clone()
    }

    fn permission_state(&self) -> ServiceState {
        self.lock().permission
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<PositionEvent>) {
        self.lock().listeners.push(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls() {
        let provider = MockPositionProvider::new();
        provider.set_desired_accuracy(AccuracyLevel::Block);
        provider.start_updating();
        provider.stop_updating();

        assert_eq!(
            provider.calls(),
            vec![
                PositionCall::SetDesiredAccuracy(AccuracyLevel::Block),
                PositionCall::StartUpdating,
                PositionCall::StopUpdating,
            ]
        );
        assert!(!provider.is_updating());
        assert_eq!(provider.desired_accuracy(), Some(AccuracyLevel::Block));
    }

    #[test]
    fn test_clones_share_state() {
        let provider = MockPositionProvider::with_permission(ServiceState::NotDetermined);
        let clone = provider.clone();
        clone.set_permission(ServiceState::Denied);
        assert_eq!(provider.permission_state(), ServiceState::Denied);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let provider = MockPositionProvider::new();
        assert_eq!(provider.emit(PositionEvent::Failed("nobody".to_string())), 0);

        let (tx, mut events) = mpsc::unbounded_channel();
        provider.subscribe(tx);
        assert_eq!(
            provider.emit(PositionEvent::PermissionChanged(ServiceState::Restricted)),
            1
        );
        assert_eq!(provider.permission_state(), ServiceState::Restricted);
        assert_eq!(
            events.recv().await,
            Some(PositionEvent::PermissionChanged(ServiceState::Restricted))
        );
    }

    #[test]
    fn test_emit_keeps_every_event_in_order() {
        let provider = MockPositionProvider::new();
        let (tx, mut events) = mpsc::unbounded_channel();
        provider.subscribe(tx);

        provider.emit(PositionEvent::PermissionChanged(ServiceState::Denied));
        for _ in 0..500 {
            provider.emit(PositionEvent::Failed("burst".to_string()));
        }

        assert_eq!(
            events.try_recv().ok(),
            Some(PositionEvent::PermissionChanged(ServiceState::Denied))
        );
        let mut rest = 0;
        while events.try_recv().is_ok() {
            rest += 1;
        }
        assert_eq!(rest, 500);
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let provider = MockPositionProvider::new();
        let (tx, events) = mpsc::unbounded_channel();
        provider.subscribe(tx);
        drop(events);

        assert_eq!(provider.emit(PositionEvent::Failed("gone".to_string())), 0);
    }
}
