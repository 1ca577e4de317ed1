//! `DeliveryApi` over the scheduler's inherent methods.

use super::RetryScheduler;
use crate::domain::errors::SchedulerError;
use crate::domain::submission::{FragmentAcceptance, InboundFragment, Submission};
use crate::ports::inbound::DeliveryApi;
use async_trait::async_trait;
use msh_01_message_store::MessageAttempt;
use shared_types::{DomainContext, MessageId, Timestamp};
use std::time::Duration;

#[async_trait]
impl DeliveryApi for RetryScheduler {
    async fn submit(
        &self,
        ctx: &DomainContext,
        submission: Submission,
    ) -> Result<MessageId, SchedulerError> {
        RetryScheduler::submit(self, ctx, submission).await
    }

    async fn schedule_sending(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        RetryScheduler::schedule_sending(self, ctx, id).await
    }

    async fn schedule_sending_after(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        delay: Duration,
    ) -> Result<(), SchedulerError> {
        RetryScheduler::schedule_sending_after(self, ctx, id, delay).await
    }

    async fn schedule_sending_with_retry_count(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        retry_count: u32,
    ) -> Result<(), SchedulerError> {
        RetryScheduler::schedule_sending_with_retry_count(self, ctx, id, retry_count).await
    }

    async fn restore_failed_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        RetryScheduler::restore_failed_message(self, ctx, id).await
    }

    async fn restore_failed_messages_during_period(
        &self,
        ctx: &DomainContext,
        begin: Timestamp,
        end: Timestamp,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError> {
        RetryScheduler::restore_failed_messages_during_period(self, ctx, begin, end, final_recipient)
            .await
    }

    async fn delete_failed_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        RetryScheduler::delete_failed_message(self, ctx, id).await
    }

    async fn delete_message(&self, ctx: &DomainContext, id: &MessageId) -> Result<(), SchedulerError> {
        RetryScheduler::delete_message(self, ctx, id).await
    }

    async fn delete(
        &self,
        ctx: &DomainContext,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>, SchedulerError> {
        RetryScheduler::delete(self, ctx, ids).await
    }

    fn get_failed_messages(
        &self,
        ctx: &DomainContext,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError> {
        RetryScheduler::get_failed_messages(self, ctx, final_recipient)
    }

    fn get_failed_message_elapsed_time(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Duration, SchedulerError> {
        RetryScheduler::get_failed_message_elapsed_time(self, ctx, id)
    }

    fn get_attempts_history(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, SchedulerError> {
        RetryScheduler::get_attempts_history(self, ctx, id)
    }

    async fn accept_inbound_fragment(
        &self,
        ctx: &DomainContext,
        fragment: InboundFragment,
    ) -> Result<FragmentAcceptance, SchedulerError> {
        RetryScheduler::accept_inbound_fragment(self, ctx, fragment).await
    }
}
