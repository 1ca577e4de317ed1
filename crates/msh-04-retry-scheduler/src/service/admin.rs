//! Scheduling requests, restore and delete.

use super::RetryScheduler;
use crate::domain::errors::SchedulerError;
use msh_01_message_store::{MessageAttempt, NewMessage, StatusUpdate, StoreError};
use shared_types::{DomainContext, MessageId, MessageStatus, NotificationStatus, Timestamp};
use std::time::Duration;
use tracing::{debug, info, warn};

impl RetryScheduler {
    pub async fn schedule_sending(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        self.schedule_sending_with_retry_count(ctx, id, 0).await
    }

    pub async fn schedule_sending_with_retry_count(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        retry_count: u32,
    ) -> Result<(), SchedulerError> {
        let Some(message) = self.inner.store.find_message(ctx, id)? else {
            self.retry_lookup(ctx, id, retry_count);
            return Ok(());
        };
        match message.status {
            MessageStatus::SendInProgress => {
                debug!(message_id = %id, "[msh-04] Already in flight");
                Ok(())
            }
            status if status.is_schedulable() => {
                if !message.source_message {
                    let at = message.next_attempt.unwrap_or_else(|| self.now());
                    self.arm(ctx, id, at, retry_count);
                }
                Ok(())
            }
            actual => Err(StoreError::StoreConflict {
                id: id.clone(),
                actual,
            }
            .into()),
        }
    }

    pub async fn schedule_sending_after(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        delay: Duration,
    ) -> Result<(), SchedulerError> {
        let message = self.inner.store.get_message(ctx, id)?;
        if message.status == MessageStatus::SendInProgress {
            debug!(message_id = %id, "[msh-04] Already in flight");
            return Ok(());
        }
        if !message.status.is_schedulable() || message.source_message {
            return Err(StoreError::StoreConflict {
                id: id.clone(),
                actual: message.status,
            }
            .into());
        }

        let at = self.now().saturating_add(delay.as_millis() as Timestamp);
        self.inner.store.transition(
            ctx,
            id,
            &[message.status],
            StatusUpdate::to(message.status).next_attempt_at(at),
        )?;
        self.arm(ctx, id, at, 0);
        Ok(())
    }

    /// Put a failed message back in the queue with a fresh attempt budget
    /// taken from the current PMode.
    ///
    /// A split source message is cut again from its stored payload into a
    /// new group; the old group and its fragments are dropped. Restoring a
    /// failed fragment restores its source message.
    pub async fn restore_failed_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        self.restore(ctx, id).await.map(|_| ())
    }

    /// Returns the id that went back in the queue.
    async fn restore(&self, ctx: &DomainContext, id: &MessageId) -> Result<MessageId, SchedulerError> {
        let message = self.inner.store.get_message(ctx, id)?;
        if message.status != MessageStatus::SendFailure {
            return Err(StoreError::StoreConflict {
                id: id.clone(),
                actual: message.status,
            }
            .into());
        }
        if message.message_fragment {
            let group_id = message
                .group_id
                .as_ref()
                .ok_or_else(|| SchedulerError::InvalidSubmission {
                    reason: format!("fragment {} has no group", id),
                })?;
            let group = self.inner.fragments.get_message_group(ctx, group_id)?;
            debug!(
                message_id = %id,
                source = %group.source_message_id,
                "[msh-04] Restoring fragment through its source"
            );
            self.restore_split_message(ctx, &group.source_message_id).await?;
            return Ok(group.source_message_id);
        }
        if message.source_message {
            self.restore_split_message(ctx, id).await?;
            return Ok(id.clone());
        }

        self.inner.legs.invalidate(ctx, id);
        let leg = self.inner.legs.resolve(ctx, id)?;

        let notification = restored_notification(message.notification_status);
        let now = self.now();
        let update = StatusUpdate::to(MessageStatus::SendEnqueued)
            .next_attempt_at(now)
            .with_send_attempts(0)
            .with_send_attempts_max(leg.max_attempts())
            .with_notification(notification)
            .restored();
        self.inner
            .store
            .transition(ctx, id, &[MessageStatus::SendFailure], update)?;

        self.publish_status(ctx, id, MessageStatus::SendFailure, MessageStatus::SendEnqueued)
            .await;
        info!(
            domain = %ctx.domain(),
            message_id = %id,
            max_attempts = leg.max_attempts(),
            "[msh-04] Message restored"
        );
        self.arm(ctx, id, now, 0);
        Ok(id.clone())
    }

    async fn restore_split_message(
        &self,
        ctx: &DomainContext,
        source_id: &MessageId,
    ) -> Result<(), SchedulerError> {
        let source = self.inner.store.get_message(ctx, source_id)?;
        if source.status != MessageStatus::SendFailure {
            return Err(StoreError::StoreConflict {
                id: source_id.clone(),
                actual: source.status,
            }
            .into());
        }

        self.inner.legs.invalidate(ctx, source_id);
        let leg = self.inner.legs.resolve(ctx, source_id)?;
        if leg.splitting.is_none() {
            return Err(SchedulerError::InvalidSubmission {
                reason: format!("leg {} no longer splits {}", leg.name, source_id),
            });
        }
        let payload = self.inner.store.get_payload(ctx, source_id)?.ok_or_else(|| {
            SchedulerError::InvalidSubmission {
                reason: format!("payload of {} is gone", source_id),
            }
        })?;

        let notification = restored_notification(source.notification_status);
        let mut template = NewMessage::outbound(source_id.clone(), source.routing.clone());
        template.notification_status = notification;
        template.send_attempts_max = leg.max_attempts();
        template.leg_name = Some(leg.name.clone());
        template.mpc = source.mpc.clone();
        template.content_type = source.content_type.clone();
        template.backend_name = source.backend_name.clone();
        template.original_sender = source.original_sender.clone();
        template.final_recipient = source.final_recipient.clone();
        template.next_attempt = Some(self.now());

        let split = self.split_into_group(ctx, &template, &payload, &leg).await?;
        let update = StatusUpdate::to(MessageStatus::SendEnqueued)
            .with_send_attempts(0)
            .with_send_attempts_max(leg.max_attempts())
            .with_notification(notification)
            .with_group(split.group_id.clone())
            .restored();
        if let Err(e) =
            self.inner
                .store
                .transition(ctx, source_id, &[MessageStatus::SendFailure], update)
        {
            self.discard_fragments(ctx, &split.group_id);
            return Err(e.into());
        }
        if let Some(old_group) = &source.group_id {
            self.discard_fragments(ctx, old_group);
        }

        self.publish_status(
            ctx,
            source_id,
            MessageStatus::SendFailure,
            MessageStatus::SendEnqueued,
        )
        .await;
        info!(
            domain = %ctx.domain(),
            message_id = %source_id,
            group_id = %split.group_id,
            fragments = split.fragment_ids.len(),
            "[msh-04] Split message restored"
        );
        self.arm_fragments(ctx, &split.fragment_ids);
        Ok(())
    }

    /// Each message is restored on its own; one failing does not stop the
    /// rest. A failed fragment is reported as its restored source message.
    pub async fn restore_failed_messages_during_period(
        &self,
        ctx: &DomainContext,
        begin: Timestamp,
        end: Timestamp,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError> {
        let candidates =
            self.inner
                .store
                .find_failed_messages_during_period(ctx, begin, end, final_recipient)?;

        let mut restored = Vec::with_capacity(candidates.len());
        for id in candidates {
            if restored.contains(&id) {
                continue;
            }
            // fragments of a source restored earlier in this pass are gone
            if let Ok(Some(current)) = self.inner.store.find_message(ctx, &id) {
                if current.message_fragment && current.status == MessageStatus::Deleted {
                    continue;
                }
            }
            match self.restore(ctx, &id).await {
                Ok(done) => {
                    if !restored.contains(&done) {
                        restored.push(done);
                    }
                }
                Err(e) => warn!(message_id = %id, error = %e, "[msh-04] Restore skipped"),
            }
        }
        info!(
            domain = %ctx.domain(),
            begin,
            end,
            restored = restored.len(),
            "[msh-04] Failed messages restored"
        );
        Ok(restored)
    }

    pub async fn delete_failed_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        self.inner.store.transition(
            ctx,
            id,
            &[MessageStatus::SendFailure],
            StatusUpdate::to(MessageStatus::Deleted),
        )?;
        self.inner.store.clear_payload(ctx, id)?;
        self.inner.legs.invalidate(ctx, id);
        self.publish_status(ctx, id, MessageStatus::SendFailure, MessageStatus::Deleted)
            .await;
        info!(domain = %ctx.domain(), message_id = %id, "[msh-04] Failed message deleted");
        Ok(())
    }

    /// Delete in any status. Deleting a split source message deletes its
    /// fragments too.
    pub async fn delete_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<(), SchedulerError> {
        let before = self.inner.store.get_message(ctx, id)?;
        self.inner.store.set_message_as_deleted(ctx, id)?;
        self.inner.legs.invalidate(ctx, id);
        self.publish_status(ctx, id, before.status, MessageStatus::Deleted)
            .await;

        if before.source_message {
            if let Some(group_id) = &before.group_id {
                for fragment in self.inner.fragments.get_fragments(ctx, group_id)? {
                    match self.inner.store.set_message_as_deleted(ctx, &fragment.message_id) {
                        Ok(_) | Err(StoreError::MessageNotFound { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                    self.inner.legs.invalidate(ctx, &fragment.message_id);
                }
            }
        }
        info!(domain = %ctx.domain(), message_id = %id, "[msh-04] Message deleted");
        Ok(())
    }

    /// Returns the ids that existed; unknown ids are ignored.
    pub async fn delete(
        &self,
        ctx: &DomainContext,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>, SchedulerError> {
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            match self.delete_message(ctx, id).await {
                Ok(()) => deleted.push(id.clone()),
                Err(SchedulerError::Store(StoreError::MessageNotFound { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    pub fn get_failed_messages(
        &self,
        ctx: &DomainContext,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, SchedulerError> {
        Ok(self.inner.store.get_failed_messages(ctx, final_recipient)?)
    }

    pub fn get_failed_message_elapsed_time(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Duration, SchedulerError> {
        Ok(self.inner.store.get_failed_message_elapsed_time(ctx, id)?)
    }

    pub fn get_attempts_history(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, SchedulerError> {
        Ok(self.inner.attempts.get_attempts_history(ctx, id)?)
    }
}

/// A restored message owes its backend a fresh outcome unless it opted out.
fn restored_notification(current: NotificationStatus) -> NotificationStatus {
    match current {
        NotificationStatus::NotRequired => NotificationStatus::NotRequired,
        _ => NotificationStatus::Required,
    }
}
