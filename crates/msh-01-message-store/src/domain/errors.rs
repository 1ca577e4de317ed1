//! # Domain Errors
//!
//! Error types for the Message Store subsystem.

use shared_types::{KVStoreError, MessageId, MessageStatus};
use thiserror::Error;

/// Errors that can occur during message store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No message with this id in the domain.
    #[error("Message not found: {id}")]
    MessageNotFound { id: MessageId },

    /// A message with this id already exists in the domain.
    #[error("Message already exists: {id}")]
    MessageExists { id: MessageId },

    /// Optimistic status check failed; nothing was written.
    #[error("Status conflict on {id}: found {actual}")]
    StoreConflict { id: MessageId, actual: MessageStatus },

    /// Attempt log entries are never rewritten.
    #[error("Attempt {sequence} of {id} already recorded")]
    AttemptExists { id: MessageId, sequence: u32 },

    /// The operation needs a message in `SEND_FAILURE`.
    #[error("Message {id} is not failed (status {status})")]
    NotFailed { id: MessageId, status: MessageStatus },

    /// A failed message carries no failure date.
    #[error("Message {id} has no failed date")]
    MissingFailedDate { id: MessageId },

    #[error("Payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Record could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Underlying key-value store failed.
    #[error(transparent)]
    Database(#[from] KVStoreError),
}

impl StoreError {
    /// Whether this is a lost compare-and-set race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StoreConflict { .. })
    }
}
