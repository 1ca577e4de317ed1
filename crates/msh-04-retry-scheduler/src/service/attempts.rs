//! Attempt history, subject to the audit switch.

use msh_01_message_store::{AttemptStatus, Message, MessageAttempt, MessageStoreApi, StoreError};
use shared_types::{DomainContext, MessageId, Timestamp};
use std::sync::Arc;
use tracing::trace;

/// Writes and reads `MessageAttempt` records.
///
/// With audit off every write is a no-op; the delivery state machine does
/// not depend on the records.
pub struct MessageAttemptService {
    store: Arc<dyn MessageStoreApi>,
    audit_active: bool,
}

impl MessageAttemptService {
    pub fn new(store: Arc<dyn MessageStoreApi>, audit_active: bool) -> Self {
        Self {
            store,
            audit_active,
        }
    }

    pub fn is_audit_active(&self) -> bool {
        self.audit_active
    }

    /// Open record for the attempt `message` just began.
    pub fn start(&self, message: &Message) -> MessageAttempt {
        MessageAttempt::started(
            message.id.clone(),
            message.attempt_sequence.saturating_add(1),
            message.attempt_started.unwrap_or(message.modified),
        )
    }

    /// Close a record. `None` when auditing is off.
    pub fn end(
        &self,
        mut attempt: MessageAttempt,
        end: Timestamp,
        status: AttemptStatus,
        error: Option<String>,
    ) -> Option<MessageAttempt> {
        if !self.audit_active {
            trace!(message_id = %attempt.message_id, "[msh-04] Attempt audit disabled");
            return None;
        }
        attempt.end = end;
        attempt.status = status;
        attempt.error = error;
        Some(attempt)
    }

    /// Persist a finished record on its own.
    pub fn create(&self, ctx: &DomainContext, attempt: MessageAttempt) -> Result<(), StoreError> {
        if !self.audit_active {
            return Ok(());
        }
        self.store.append_attempt(ctx, attempt)
    }

    /// Close an open record and persist it.
    pub fn update_end_date_and_create(
        &self,
        ctx: &DomainContext,
        attempt: MessageAttempt,
        end: Timestamp,
        status: AttemptStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        match self.end(attempt, end, status, error) {
            Some(attempt) => self.store.append_attempt(ctx, attempt),
            None => Ok(()),
        }
    }

    pub fn get_attempts_history(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Vec<MessageAttempt>, StoreError> {
        self.store.get_attempts(ctx, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msh_01_message_store::{MessageRouting, MessageStoreService, NewMessage, StoreConfig};
    use shared_types::{InMemoryKVStore, MockTimeSource};

    fn store_with_message() -> (Arc<dyn MessageStoreApi>, Message) {
        let store: Arc<dyn MessageStoreApi> = Arc::new(MessageStoreService::new(
            InMemoryKVStore::new(),
            MockTimeSource::new(500),
            StoreConfig::for_testing(),
        ));
        let routing = MessageRouting {
            from_party: "a".into(),
            to_party: "b".into(),
            service: "s".into(),
            action: "x".into(),
        };
        let message = store
            .save(
                &DomainContext::default_domain(),
                NewMessage::outbound(MessageId::new("m1").unwrap(), routing),
                None,
            )
            .unwrap();
        (store, message)
    }

    #[test]
    fn test_disabled_audit_writes_nothing() {
        let (store, message) = store_with_message();
        let service = MessageAttemptService::new(Arc::clone(&store), false);
        let ctx = DomainContext::default_domain();

        let attempt = service.start(&message);
        assert!(service
            .end(attempt.clone(), 600, AttemptStatus::Error, None)
            .is_none());
        service
            .update_end_date_and_create(&ctx, attempt, 600, AttemptStatus::Error, None)
            .unwrap();

        assert!(service.get_attempts_history(&ctx, &message.id).unwrap().is_empty());
    }

    #[test]
    fn test_record_closed_and_stored() {
        let (store, message) = store_with_message();
        let service = MessageAttemptService::new(store, true);
        let ctx = DomainContext::default_domain();

        let attempt = service.start(&message);
        assert_eq!(attempt.sequence, 1);
        assert_eq!(attempt.start, 500);
        service
            .update_end_date_and_create(
                &ctx,
                attempt,
                750,
                AttemptStatus::Abort,
                Some("operator abort".into()),
            )
            .unwrap();

        let history = service.get_attempts_history(&ctx, &message.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].end, 750);
        assert_eq!(history[0].status, AttemptStatus::Abort);
    }
}
