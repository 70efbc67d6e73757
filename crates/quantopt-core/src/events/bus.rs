//! In-process event bus.
//!
//! Backed by a bounded `broadcast` channel: publishing never waits on
//! subscribers, and a subscriber that falls more than the buffer capacity
//! behind loses the oldest events and is told how many it missed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::Event;
use crate::error::SubscriberError;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct BusInner {
    sender: broadcast::Sender<Event>,
    subscribers: Mutex<HashMap<SubscriptionId, CancellationToken>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        match self.subscribers.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Cloneable handle to one bus instance.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                sender,
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Deliver an event to every current subscriber. Never blocks and never fails.
    pub fn publish(&self, event: Event) {
        // An error only means nobody is listening right now.
        let _ = self.inner.sender.send(event);
    }

    /// Register a new subscriber. It sees events published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        // Registration and receiver creation happen under the same lock so an
        // unsubscribe racing with subscribe always sees the entry.
        let receiver = {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.insert(id, cancel.clone());
            self.inner.sender.subscribe()
        };
        debug!(subscriber_id = %id, "Subscriber registered");
        Subscription {
            id,
            receiver,
            cancel,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!(subscriber_id = %id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

/// One subscriber's ordered view of the bus.
pub struct Subscription {
    id: SubscriptionId,
    receiver: broadcast::Receiver<Event>,
    cancel: CancellationToken,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once unsubscribed or the bus is gone.
    ///
    /// `Some(Err(Lagged(n)))` reports that `n` events were dropped for this
    /// subscriber only; the following call resumes with the oldest event
    /// still buffered.
    pub async fn recv(&mut self) -> Option<Result<Event, SubscriberError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            received = self.receiver.recv() => match received {
                Ok(event) => Some(Ok(event)),
                Err(RecvError::Lagged(missed)) => {
                    warn!(subscriber_id = %self.id, missed, "Subscriber lagged");
                    Some(Err(SubscriberError::Lagged(missed)))
                }
                Err(RecvError::Closed) => None,
            },
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]. `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Result<Event, SubscriberError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(TryRecvError::Lagged(missed)) => Some(Err(SubscriberError::Lagged(missed))),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Unsubscribe this handle. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
        self.cancel.cancel();
    }

    /// Lazy stream of events that ends on unsubscribe.
    pub fn into_stream(self) -> impl Stream<Item = Result<Event, SubscriberError>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|item| (item, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.lock().remove(&self.id);
        }
    }
}
