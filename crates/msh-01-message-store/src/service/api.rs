//! `MessageStoreApi` implementation.

use super::*;
use crate::domain::entities::{AttemptCompletion, MessageAttempt, NewMessage, StatusUpdate};
use crate::ports::inbound::MessageStoreApi;
use crate::ports::outbound::BatchOperation;
use shared_types::{MessageStatus, NotificationStatus, Timestamp};
use std::time::Duration;
use tracing::debug;

fn conflict(message: &Message) -> StoreError {
    StoreError::StoreConflict {
        id: message.id.clone(),
        actual: message.status,
    }
}

fn matches_recipient(message: &Message, final_recipient: Option<&str>) -> bool {
    final_recipient.map_or(true, |r| message.final_recipient.as_deref() == Some(r))
}

/// Bookkeeping shared by every status change.
fn apply_status(message: &mut Message, status: MessageStatus, now: Timestamp) {
    message.status = status;
    message.modified = now;
    if status != MessageStatus::SendInProgress {
        message.attempt_started = None;
    }
    match status {
        MessageStatus::SendFailure if message.failed.is_none() => message.failed = Some(now),
        MessageStatus::Deleted => {
            message.deleted = Some(now);
            message.next_attempt = None;
        }
        _ => {}
    }
}

impl<KV, TS> MessageStoreApi for MessageStoreService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    fn save(
        &self,
        ctx: &DomainContext,
        new: NewMessage,
        payload: Option<Vec<u8>>,
    ) -> Result<Message, StoreError> {
        if let Some(payload) = &payload {
            if payload.len() > self.config.max_payload_bytes {
                return Err(StoreError::PayloadTooLarge {
                    size: payload.len(),
                    max: self.config.max_payload_bytes,
                });
            }
        }

        let now = self.time_source.now();
        let mut kv = self.kv_store.lock();
        if Self::load(&kv, ctx, &new.id)?.is_some() {
            return Err(StoreError::MessageExists { id: new.id });
        }

        let message = Message {
            id: new.id,
            status: new.status,
            msh_role: new.msh_role,
            notification_status: new.notification_status,
            send_attempts: 0,
            send_attempts_max: new.send_attempts_max,
            attempt_sequence: 0,
            next_attempt: new.next_attempt,
            attempt_started: None,
            mpc: new.mpc,
            backend_name: new.backend_name,
            original_sender: new.original_sender,
            final_recipient: new.final_recipient,
            routing: new.routing,
            leg_name: new.leg_name,
            content_type: new.content_type,
            source_message: new.source_message,
            message_fragment: new.message_fragment,
            group_id: new.group_id,
            received: now,
            modified: now,
            restored: None,
            failed: None,
            deleted: None,
        };

        let mut batch = vec![BatchOperation::put(
            keys::message_key(ctx, &message.id),
            encode(&message)?,
        )];
        if let Some(payload) = payload {
            batch.push(BatchOperation::put(keys::payload_key(ctx, &message.id), payload));
        }
        kv.atomic_batch_write(batch)?;

        debug!(
            domain = %ctx.domain(),
            message_id = %message.id,
            status = %message.status,
            "[msh-01] message saved"
        );
        Ok(message)
    }

    fn get_message(&self, ctx: &DomainContext, id: &MessageId) -> Result<Message, StoreError> {
        let kv = self.kv_store.lock();
        Self::load_existing(&kv, ctx, id)
    }

    fn find_message(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError> {
        let kv = self.kv_store.lock();
        Self::load(&kv, ctx, id)
    }

    fn get_payload(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let kv = self.kv_store.lock();
        Ok(kv.get(&keys::payload_key(ctx, id))?)
    }

    fn clear_payload(&self, ctx: &DomainContext, id: &MessageId) -> Result<(), StoreError> {
        let mut kv = self.kv_store.lock();
        kv.delete(&keys::payload_key(ctx, id))?;
        Ok(())
    }

    fn begin_attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        now: Timestamp,
    ) -> Result<Message, StoreError> {
        let mut kv = self.kv_store.lock();
        let mut message = Self::load_existing(&kv, ctx, id)?;

        let due = message.next_attempt.map_or(true, |at| at <= now);
        if !message.status.is_schedulable() || !due {
            return Err(conflict(&message));
        }

        apply_status(&mut message, MessageStatus::SendInProgress, now);
        message.attempt_started = Some(now);
        Self::store(&mut kv, ctx, &message)?;
        Ok(message)
    }

    fn complete_attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        completion: AttemptCompletion,
        attempt: Option<MessageAttempt>,
    ) -> Result<Message, StoreError> {
        let now = self.time_source.now();
        let mut kv = self.kv_store.lock();
        let mut message = Self::load_existing(&kv, ctx, id)?;
        if message.status != MessageStatus::SendInProgress {
            return Err(conflict(&message));
        }

        message.send_attempts = message.send_attempts.saturating_add(1);
        message.attempt_sequence = message.attempt_sequence.saturating_add(1);
        message.next_attempt = completion.next_attempt;
        if let Some(notification) = completion.notification_status {
            message.notification_status = notification;
        }
        apply_status(&mut message, completion.status, now);

        let mut batch = vec![BatchOperation::put(
            keys::message_key(ctx, id),
            encode(&message)?,
        )];
        if let Some(mut attempt) = attempt {
            attempt.message_id = id.clone();
            attempt.sequence = message.attempt_sequence;
            batch.push(BatchOperation::put(
                keys::attempt_key(ctx, id, attempt.sequence),
                encode(&attempt)?,
            ));
        }
        kv.atomic_batch_write(batch)?;
        Ok(message)
    }

    fn transition(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        expected: &[MessageStatus],
        update: StatusUpdate,
    ) -> Result<Message, StoreError> {
        let now = self.time_source.now();
        let mut kv = self.kv_store.lock();
        let mut message = Self::load_existing(&kv, ctx, id)?;
        if !expected.contains(&message.status) {
            return Err(conflict(&message));
        }

        let from = message.status;
        message.next_attempt = update.next_attempt;
        if let Some(attempts) = update.send_attempts {
            message.send_attempts = attempts;
        }
        if let Some(max) = update.send_attempts_max {
            message.send_attempts_max = max;
        }
        if let Some(notification) = update.notification_status {
            message.notification_status = notification;
        }
        if update.restored {
            message.restored = Some(now);
            message.failed = None;
        }
        if let Some(group_id) = update.group_id {
            message.group_id = Some(group_id);
        }
        apply_status(&mut message, update.status, now);
        Self::store(&mut kv, ctx, &message)?;

        debug!(
            domain = %ctx.domain(),
            message_id = %id,
            "[msh-01] {} -> {}",
            from,
            message.status
        );
        Ok(message)
    }

    fn mark_notified(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<Message, StoreError> {
        let mut kv = self.kv_store.lock();
        let mut message = Self::load_existing(&kv, ctx, id)?;
        if message.status != status {
            return Err(conflict(&message));
        }
        if message.notification_status == NotificationStatus::Required {
            message.notification_status = NotificationStatus::Notified;
            message.modified = self.time_source.now();
            Self::store(&mut kv, ctx, &message)?;
        }
        Ok(message)
    }

    fn append_attempt(
        &self,
        ctx: &DomainContext,
        attempt: MessageAttempt,
    ) -> Result<(), StoreError> {
        let key = keys::attempt_key(ctx, &attempt.message_id, attempt.sequence);
        let mut kv = self.kv_store.lock();
        if kv.exists(&key)? {
            return Err(StoreError::AttemptExists {
                id: attempt.message_id,
                sequence: attempt.sequence,
            });
        }
        kv.put(&key, &encode(&attempt)?)?;
        Ok(())
    }

    fn get_attempts(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, StoreError> {
        let kv = self.kv_store.lock();
        kv.prefix_scan(&keys::attempt_prefix(ctx, id))?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    fn set_message_as_deleted(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Message, StoreError> {
        let now = self.time_source.now();
        let mut kv = self.kv_store.lock();
        let mut message = Self::load_existing(&kv, ctx, id)?;
        if message.status == MessageStatus::Deleted {
            return Ok(message);
        }

        apply_status(&mut message, MessageStatus::Deleted, now);
        kv.atomic_batch_write(vec![
            BatchOperation::put(keys::message_key(ctx, id), encode(&message)?),
            BatchOperation::delete(keys::payload_key(ctx, id)),
        ])?;

        debug!(domain = %ctx.domain(), message_id = %id, "[msh-01] message deleted");
        Ok(message)
    }

    fn get_failed_messages(
        &self,
        ctx: &DomainContext,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, StoreError> {
        let kv = self.kv_store.lock();
        Ok(Self::scan_messages(&kv, ctx)?
            .into_iter()
            .filter(|m| m.status == MessageStatus::SendFailure)
            .filter(|m| matches_recipient(m, final_recipient))
            .map(|m| m.id)
            .collect())
    }

    fn find_failed_messages_during_period(
        &self,
        ctx: &DomainContext,
        begin: Timestamp,
        end: Timestamp,
        final_recipient: Option<&str>,
    ) -> Result<Vec<MessageId>, StoreError> {
        let kv = self.kv_store.lock();
        Ok(Self::scan_messages(&kv, ctx)?
            .into_iter()
            .filter(|m| m.status == MessageStatus::SendFailure)
            .filter(|m| m.failed.map_or(false, |f| f >= begin && f <= end))
            .filter(|m| matches_recipient(m, final_recipient))
            .map(|m| m.id)
            .collect())
    }

    fn get_failed_message_elapsed_time(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Duration, StoreError> {
        let message = self.get_message(ctx, id)?;
        if message.status != MessageStatus::SendFailure {
            return Err(StoreError::NotFailed {
                id: id.clone(),
                status: message.status,
            });
        }
        let failed = message
            .failed
            .ok_or_else(|| StoreError::MissingFailedDate { id: id.clone() })?;
        let elapsed = self.time_source.now().saturating_sub(failed);
        Ok(Duration::from_millis(elapsed))
    }

    fn find_by_status(
        &self,
        ctx: &DomainContext,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>, StoreError> {
        let kv = self.kv_store.lock();
        Ok(Self::scan_messages(&kv, ctx)?
            .into_iter()
            .filter(|m| statuses.contains(&m.status))
            .collect())
    }
}
