//! # Inbound Ports (Driving Ports)
//!
//! The API the Message Store offers to the scheduler, the fragment manager
//! and administrative callers.

use crate::domain::entities::{
    AttemptCompletion, Message, MessageAttempt, NewMessage, StatusUpdate,
};
use crate::domain::errors::StoreError;
use shared_types::{DomainContext, MessageId, MessageStatus, Timestamp};
use std::time::Duration;

/// Primary API for the Message Store.
///
/// Every method is scoped to a domain and every write is a single atomic
/// batch, so a reader never sees a status without the attempt record that
/// caused it.
pub trait MessageStoreApi: Send + Sync {
    /// Persist a new message and, optionally, its payload.
    ///
    /// # Errors
    /// - `MessageExists`: the id is already taken in this domain
    /// - `PayloadTooLarge`: payload exceeds `StoreConfig::max_payload_bytes`
    fn save(
        &self,
        ctx: &DomainContext,
        message: NewMessage,
        payload: Option<Vec<u8>>,
    ) -> Result<Message, StoreError>;

    /// # Errors
    /// - `MessageNotFound`
    fn get_message(&self, ctx: &DomainContext, id: &MessageId) -> Result<Message, StoreError>;

    fn find_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError>;

    fn get_payload(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    fn clear_payload(&self, ctx: &DomainContext, id: &MessageId) -> Result<(), StoreError>;

    /// Claim the message for one attempt.
    ///
    /// Succeeds only from a schedulable status whose `next_attempt` is due;
    /// the message becomes `SendInProgress` with `attempt_started = now`.
    ///
    /// # Errors
    /// - `StoreConflict`: not schedulable or not yet due
    fn begin_attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        now: Timestamp,
    ) -> Result<Message, StoreError>;

    /// Finish the in-flight attempt.
    ///
    /// Applies `completion`, consumes one attempt, advances
    /// `attempt_sequence` and appends `attempt` (re-keyed to the new
    /// sequence) in the same batch.
    ///
    /// # Errors
    /// - `StoreConflict`: the message left `SendInProgress` (e.g. deleted)
    fn complete_attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        completion: AttemptCompletion,
        attempt: Option<MessageAttempt>,
    ) -> Result<Message, StoreError>;

    /// Compare-and-set from any of `expected` to `update.status`.
    ///
    /// # Errors
    /// - `StoreConflict`: current status not in `expected`
    fn transition(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        expected: &[MessageStatus],
        update: StatusUpdate,
    ) -> Result<Message, StoreError>;

    /// Record that the backend was told about the message's current
    /// `status`. A message that owes no notification is left as is.
    ///
    /// # Errors
    /// - `StoreConflict`: the status moved on since the notification
    fn mark_notified(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<Message, StoreError>;

    /// Append an attempt outside of `complete_attempt`.
    fn append_attempt(&self, ctx: &DomainContext, attempt: MessageAttempt)
        -> Result<(), StoreError>;

    /// Attempt log ordered by sequence.
    fn get_attempts(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, StoreError>;

    /// Move the message to `Deleted` and drop its payload. Idempotent.
    fn set_message_as_deleted(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Message, StoreError>;

    /// Ids of `SendFailure` messages, optionally for one final recipient.
    fn get_failed_messages(
        &self,
        ctx: &DomainContext,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, StoreError>;

    /// Ids of `SendFailure` messages whose failed date is in `[begin, end]`.
    fn find_failed_messages_during_period(
        &self,
        ctx: &DomainContext,
        begin: Timestamp,
        end: Timestamp,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, StoreError>;

    /// Time since the message failed.
    ///
    /// # Errors
    /// - `NotFailed`: status is not `SendFailure`
    /// - `MissingFailedDate`
    fn get_failed_message_elapsed_time(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Duration, StoreError>;

    fn find_by_status(
        &self,
        ctx: &DomainContext,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>, StoreError>;
}
