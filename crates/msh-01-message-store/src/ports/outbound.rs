//! # Outbound Ports (Driven Ports)
//!
//! The store persists through the shared key-value port and reads time from
//! the shared clock. Both are defined in `shared-types` so every subsystem
//! can be wired to the same adapters.

pub use shared_types::{BatchOperation, KVStoreError, KeyValueStore, TimeSource};
