//! # Shared Bus - Backend Notification Channel
//!
//! The gateway core never calls backend connectors directly. It publishes a
//! [`GatewayEvent`] and every connector (or the runtime's notification
//! logger) subscribes with a filter.
//!
//! ```text
//! ┌────────────────┐   publish()    ┌──────────────┐  subscribe()  ┌───────────────┐
//! │ Retry          │ ─────────────→ │  Event Bus   │ ────────────→ │ Backend       │
//! │ Scheduler      │                │  (broadcast) │               │ connector(s)  │
//! └────────────────┘                └──────────────┘               └───────────────┘
//! ```
//!
//! ## Delivery semantics
//!
//! Notifications are at-least-once from the connector's point of view: a
//! restart may re-emit a status change that was already observed. Every event
//! carries the domain and message id so connectors can deduplicate.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, GatewayEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
