//! Store configuration.

/// Configuration for the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Largest payload accepted by `save`, in bytes.
    pub max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 256 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Configuration for tests: small payload ceiling.
    pub fn for_testing() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
        }
    }
}
