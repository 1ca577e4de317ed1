//! # Outbound Ports (Driven Ports)
//!
//! Group and fragment records persist through the shared key-value port.
//! Fragment payloads live on the file system, next to their digests.

pub use shared_types::{BatchOperation, KVStoreError, KeyValueStore, TimeSource};
