//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Rejected identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Invalid domain code: {code:?}")]
    InvalidDomain { code: String },

    #[error("Message id must not be empty")]
    EmptyMessageId,

    #[error("Message id too long: {len} chars, max {max}")]
    MessageIdTooLong { len: usize, max: usize },

    #[error("Invalid message id: {id:?}")]
    InvalidMessageId { id: String },

    #[error("Invalid group id: {id:?}")]
    InvalidGroupId { id: String },
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}
