//! Mock heading provider for testing.

use crate::providers::{HeadingEvent, HeadingProvider};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A control call received by [`MockHeadingProvider`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingCall {
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `set_filter_accuracy`
    SetFilterAccuracy(f64),
}

#[derive(Debug)]
struct Inner {
    available: bool,
    running: bool,
    calls: Vec<HeadingCall>,
    listeners: Vec<mpsc::UnboundedSender<HeadingEvent>>,
}

/// Mock heading provider.
#[derive(Debug, Clone)]
pub struct MockHeadingProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MockHeadingProvider {
    /// Create a provider with a working compass.
    #[must_use]
    pub fn new() -> Self {
        Self::with_availability(true)
    }

    /// Create a provider that reports `available`.
    #[must_use]
    pub fn with_availability(available: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                available,
                running: false,
                calls: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change what `is_available` reports.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Deliver an event to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: HeadingEvent) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|listener| listener.send(event.clone()).is_ok());
        inner.listeners.len()
    }

    /// Whether the provider has been started and not stopped since.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Every control call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HeadingCall> {
        self.lock().calls.clone()
    }
}

impl Default for MockHeadingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingProvider for MockHeadingProvider {
    fn start(&self) {
        let mut inner = self.lock();
        inner.running = true;
        inner.calls.push(HeadingCall::Start);
    }

    fn stop(&self) {
        let mut inner = self.lock();
        inner.running = false;
        inner.calls.push(HeadingCall::Stop);
    }

    fn set_filter_accuracy(&self, degrees: f64) {
        self.lock().calls.push(HeadingCall::SetFilterAccuracy(degrees));
    }

    fn is_available(&self) -> bool {
        self.lock().available
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<HeadingEvent>) {
        self.lock().listeners.push(events);
    }
}
