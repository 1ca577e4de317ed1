//! # Domain Errors
//!
//! Structural errors (`FragmentCreation`, `IncompleteFragmentSet`,
//! `MalformedSourceMessage`, `ChecksumMismatch`) are fatal for the group and
//! never retried automatically.

use shared_types::{GroupId, KVStoreError, MessageId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitAndJoinError {
    /// A fragment file could not be read, or the file list does not fit the
    /// group. Nothing was written.
    #[error("Fragment creation failed: {reason}")]
    FragmentCreation { reason: String },

    #[error("Incomplete fragment set for group {group_id}: {found} of {expected}")]
    IncompleteFragmentSet {
        group_id: GroupId,
        expected: u32,
        found: u32,
    },

    #[error("Malformed source message: {reason}")]
    MalformedSourceMessage { reason: String },

    #[error("Fragment {fragment_number} of group {group_id} failed checksum verification")]
    ChecksumMismatch {
        group_id: GroupId,
        fragment_number: u32,
    },

    #[error("Invalid message group: {reason}")]
    InvalidGroup { reason: String },

    #[error("Message group not found: {group_id}")]
    GroupNotFound { group_id: GroupId },

    #[error("Message group already exists: {group_id}")]
    GroupExists { group_id: GroupId },

    /// Fragment numbers are unique within a group.
    #[error("Fragment {fragment_number} of group {group_id} already registered")]
    DuplicateFragment {
        group_id: GroupId,
        fragment_number: u32,
    },

    #[error("No fragment for message {message_id}")]
    FragmentNotFound { message_id: MessageId },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error(transparent)]
    Database(#[from] KVStoreError),
}

impl SplitAndJoinError {
    pub(crate) fn io(context: &str, e: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", context, e),
        }
    }
}
