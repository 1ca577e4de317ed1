//! # Inbound Ports (Driving Ports)

use crate::domain::errors::SchedulerError;
use crate::domain::submission::{FragmentAcceptance, InboundFragment, Submission};
use async_trait::async_trait;
use msh_01_message_store::MessageAttempt;
use shared_types::{DomainContext, MessageId, Timestamp};
use std::time::Duration;

/// Delivery API offered to backends and administrators.
///
/// Scheduling calls return once the attempt is queued; the attempt itself
/// runs on the scheduler's tasks.
#[async_trait]
pub trait DeliveryApi: Send + Sync {
    /// Resolve the leg, store the message (split when the leg allows it and
    /// the payload exceeds one fragment) and queue the first attempt.
    ///
    /// # Errors
    /// - `Configuration(ConfigurationNotFound)`: nothing is stored
    /// - `Store(MessageExists)`
    async fn submit(&self, ctx: &DomainContext, submission: Submission)
        -> Result<MessageId, SchedulerError>;

    /// Queue an attempt at the message's next attempt time. A message
    /// already in flight is left alone.
    async fn schedule_sending(&self, ctx: &DomainContext, id: &MessageId)
        -> Result<(), SchedulerError>;

    /// Queue an attempt `delay` from now.
    async fn schedule_sending_after(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        delay: Duration,
    ) -> Result<(), SchedulerError>;

    /// Queue an attempt carrying a lookup retry count. A message that is not
    /// visible yet is re-queued until the count reaches the configured limit;
    /// the count is independent of the message's send attempts.
    async fn schedule_sending_with_retry_count(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        retry_count: u32,
    ) -> Result<(), SchedulerError>;

    /// Reset a `SendFailure` message and queue it again. A split source
    /// message is split again into a new group; a fragment restores its
    /// source.
    ///
    /// # Errors
    /// - `Store(StoreConflict)`: the message is not failed
    /// - `InvalidSubmission`: a split message whose leg stopped splitting or
    ///   whose payload is gone
    async fn restore_failed_message(&self, ctx: &DomainContext, id: &MessageId)
        -> Result<(), SchedulerError>;

    /// Restore every message that failed within `[begin, end]`. A message
    /// that cannot be restored is skipped; the others proceed.
    async fn restore_failed_messages_during_period(
        &self,
        ctx: &DomainContext,
        begin: Timestamp,
        end: Timestamp,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError>;

    /// # Errors
    /// - `Store(StoreConflict)`: the message is not failed
    async fn delete_failed_message(&self, ctx: &DomainContext, id: &MessageId)
        -> Result<(), SchedulerError>;

    /// Delete in any state. An attempt in flight is discarded when it ends.
    async fn delete_message(&self, ctx: &DomainContext, id: &MessageId)
        -> Result<(), SchedulerError>;

    /// Delete several messages; returns the ids that were found.
    async fn delete(&self, ctx: &DomainContext, ids: &[MessageId])
        -> Result<Vec<MessageId>, SchedulerError>;

    fn get_failed_messages(
        &self,
        ctx: &DomainContext,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError>;

    fn get_failed_message_elapsed_time(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Duration, SchedulerError>;

    fn get_attempts_history(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, SchedulerError>;

    /// Store one received fragment; rejoins the source message when the
    /// group is complete. A rejoin that hits an environmental error is
    /// reported as `Deferred` and retried by recovery and maintenance.
    async fn accept_inbound_fragment(
        &self,
        ctx: &DomainContext,
        fragment: InboundFragment,
    ) -> Result<FragmentAcceptance, SchedulerError>;
}
