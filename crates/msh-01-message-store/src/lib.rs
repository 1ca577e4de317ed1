//! # Message Store (msh-01)
//!
//! The durable record of every message the gateway sends or receives: its
//! identity, its lifecycle status, its retry counters, its payload and the
//! append-only log of delivery attempts.
//!
//! ## Ownership
//!
//! The store exclusively owns `Message` and `MessageAttempt` records. Other
//! subsystems read them through [`MessageStoreApi`] and change them only
//! through its compare-and-set operations.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Enforced by |
//! |----|-----------|-------------|
//! | 1 | Atomic transitions | status and attempt record written in one batch |
//! | 2 | Single in-flight attempt | `begin_attempt` CAS into `SendInProgress` |
//! | 3 | Append-only attempts | attempt keys are never rewritten |
//! | 4 | Idempotent delete | deleting a `Deleted` message is a no-op |
//! | 5 | Tenant isolation | every key starts with the domain code |
//!
//! ## Key Layout
//!
//! ```text
//! <domain>/msg/<message-id>                  → Message        (bincode)
//! <domain>/att/<message-id>/<seq:010>        → MessageAttempt (bincode)
//! <domain>/payload/<message-id>              → raw bytes
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use msh_01_message_store::{MessageStoreApi, MessageStoreService, NewMessage, StoreConfig};
//!
//! let store = MessageStoreService::new(InMemoryKVStore::new(), SystemTimeSource, StoreConfig::default());
//! let saved = store.save(&ctx, NewMessage::outbound(id, routing), Some(payload))?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::config::StoreConfig;
pub use domain::entities::{
    AttemptCompletion, AttemptStatus, Message, MessageAttempt, MessageRouting, NewMessage,
    StatusUpdate,
};
pub use domain::errors::StoreError;
pub use ports::inbound::MessageStoreApi;
pub use service::MessageStoreService;

#[cfg(feature = "locking")]
pub use adapters::lock::{DatabaseLock, LockError};
