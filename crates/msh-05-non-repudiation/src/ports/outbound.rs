//! # Outbound Ports (Driven Ports)

pub use shared_types::{KVStoreError, KeyValueStore, TimeSource};
