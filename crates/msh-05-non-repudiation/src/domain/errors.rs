//! # Domain Errors
//!
//! The recording path never surfaces these; they reach callers of the
//! read and retention operations only.

use shared_types::{KVStoreError, MessageId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonRepudiationError {
    #[error("Envelope of {message_id} is {size} bytes, limit {max}")]
    EnvelopeTooLarge {
        message_id: MessageId,
        size: usize,
        max: usize,
    },

    /// A stored envelope no longer matches its digest.
    #[error("Envelope {index} of {message_id} failed digest verification")]
    DigestMismatch { message_id: MessageId, index: usize },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error(transparent)]
    Database(#[from] KVStoreError),
}
