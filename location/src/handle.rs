//! Consumer-side handles.
//!
//! The managers own every request; callers only hold the receiving end of a
//! request's delivery channel plus its [`RequestId`].

use crate::id::RequestId;
use crate::state::{HeadingOutcome, LocationOutcome};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// The eventual outcome of a single location request.
#[derive(Debug)]
pub struct PendingLocation {
    id: RequestId,
    receiver: oneshot::Receiver<LocationOutcome>,
}

impl PendingLocation {
    pub(crate) const fn new(id: RequestId, receiver: oneshot::Receiver<LocationOutcome>) -> Self {
        Self { id, receiver }
    }

    /// Identifier to force-complete or cancel the request with.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the outcome.
    ///
    /// Returns `None` if the request was cancelled.
    pub async fn outcome(self) -> Option<LocationOutcome> {
        self.receiver.await.ok()
    }

    /// The outcome, if it has already been delivered.
    pub fn try_outcome(&mut self) -> Option<LocationOutcome> {
        self.receiver.try_recv().ok()
    }
}

/// Stream of outcomes for a location subscription.
///
/// The stream ends when the subscription is cancelled, force-completed or
/// terminated by a permission change or provider error.
#[derive(Debug)]
pub struct LocationSubscription {
    id: RequestId,
    receiver: mpsc::UnboundedReceiver<LocationOutcome>,
}

impl LocationSubscription {
    pub(crate) const fn new(id: RequestId, receiver: mpsc::UnboundedReceiver<LocationOutcome>) -> Self {
        Self { id, receiver }
    }

    /// Identifier to cancel the subscription with.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the next outcome, `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<LocationOutcome> {
        self.receiver.recv().await
    }

    /// The next outcome if one is already queued.
    pub fn try_next(&mut self) -> Option<LocationOutcome> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for LocationSubscription {
    type Item = LocationOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Stream of outcomes for a heading subscription.
#[derive(Debug)]
pub struct HeadingSubscription {
    id: RequestId,
    receiver: mpsc::UnboundedReceiver<HeadingOutcome>,
}

impl HeadingSubscription {
    pub(crate) const fn new(id: RequestId, receiver: mpsc::UnboundedReceiver<HeadingOutcome>) -> Self {
        Self { id, receiver }
    }

    /// Identifier to cancel the subscription with.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the next outcome, `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<HeadingOutcome> {
        self.receiver.recv().await
    }

    /// The next outcome if one is already queued.
    pub fn try_next(&mut self) -> Option<HeadingOutcome> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for HeadingSubscription {
    type Item = HeadingOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
