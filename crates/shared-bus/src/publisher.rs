//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventFilter, GatewayEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing events to the bus.
///
/// Publishing never fails: an event nobody listens to is dropped.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event and return the number of subscribers that got it.
    async fn publish(&self, event: GatewayEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<GatewayEvent>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, domains = ?filter.domains, "[shared-bus] new subscription");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Get a stream of events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: GatewayEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(topic = ?topic, receivers, "[shared-bus] event published");
                receivers
            }
            Err(_) => {
                trace!(topic = ?topic, "[shared-bus] event dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
