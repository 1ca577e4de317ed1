//! Message store service tests.

use super::*;
use crate::domain::entities::{
    AttemptCompletion, AttemptStatus, MessageAttempt, MessageRouting, NewMessage, StatusUpdate,
};
use crate::ports::inbound::MessageStoreApi;
use shared_types::{
    DomainId, FileBackedKVStore, GroupId, InMemoryKVStore, MessageStatus, MockTimeSource,
    NotificationStatus,
};
use std::sync::Arc;
use std::time::Duration;

type TestStore = MessageStoreService<InMemoryKVStore, Arc<MockTimeSource>>;

fn make_test_service() -> (Arc<MockTimeSource>, TestStore) {
    let clock = Arc::new(MockTimeSource::new(1_000));
    let store = MessageStoreService::new(
        InMemoryKVStore::new(),
        clock.clone(),
        StoreConfig::for_testing(),
    );
    (clock, store)
}

fn ctx() -> DomainContext {
    DomainContext::default_domain()
}

fn id(s: &str) -> MessageId {
    MessageId::new(s).unwrap()
}

fn routing() -> MessageRouting {
    MessageRouting {
        from_party: "blue_gw".into(),
        to_party: "red_gw".into(),
        service: "bdx:noprocess".into(),
        action: "TC1Leg1".into(),
    }
}

fn outbound(s: &str) -> NewMessage {
    NewMessage {
        send_attempts_max: 3,
        final_recipient: Some("urn:recipient:1".into()),
        ..NewMessage::outbound(id(s), routing())
    }
}

fn failed_attempt(message: &str) -> MessageAttempt {
    MessageAttempt {
        status: AttemptStatus::Error,
        error: Some("503".into()),
        ..MessageAttempt::started(id(message), 0, 1_000)
    }
}

/// Drive a saved message to SEND_FAILURE through one attempt.
fn fail(store: &TestStore, s: &str) -> Message {
    store.begin_attempt(&ctx(), &id(s), u64::MAX).unwrap();
    store
        .complete_attempt(&ctx(), &id(s), AttemptCompletion::failure(), Some(failed_attempt(s)))
        .unwrap()
}

#[test]
fn test_save_and_get() {
    let (_, store) = make_test_service();

    let saved = store.save(&ctx(), outbound("m1"), Some(b"<xml/>".to_vec())).unwrap();
    assert_eq!(saved.status, MessageStatus::SendEnqueued);
    assert_eq!(saved.received, 1_000);
    assert_eq!(saved.send_attempts, 0);

    assert_eq!(store.get_message(&ctx(), &id("m1")).unwrap(), saved);
    assert_eq!(store.get_payload(&ctx(), &id("m1")).unwrap(), Some(b"<xml/>".to_vec()));
}

#[test]
fn test_duplicate_id_rejected() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();

    assert!(matches!(
        store.save(&ctx(), outbound("m1"), None),
        Err(StoreError::MessageExists { .. })
    ));
}

#[test]
fn test_payload_limit() {
    let (_, store) = make_test_service();
    let big = vec![0u8; store.config().max_payload_bytes + 1];

    assert!(matches!(
        store.save(&ctx(), outbound("m1"), Some(big)),
        Err(StoreError::PayloadTooLarge { .. })
    ));
    assert!(store.find_message(&ctx(), &id("m1")).unwrap().is_none());
}

#[test]
fn test_domains_are_isolated() {
    let (_, store) = make_test_service();
    let red = DomainContext::new(DomainId::new("red").unwrap());
    let blue = DomainContext::new(DomainId::new("blue").unwrap());

    store.save(&red, outbound("m1"), None).unwrap();

    assert!(store.find_message(&blue, &id("m1")).unwrap().is_none());
    // Same id is free in another domain.
    assert!(store.save(&blue, outbound("m1"), None).is_ok());
}

#[test]
fn test_begin_attempt_gates_single_flight() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();

    let claimed = store.begin_attempt(&ctx(), &id("m1"), 1_000).unwrap();
    assert_eq!(claimed.status, MessageStatus::SendInProgress);
    assert_eq!(claimed.attempt_started, Some(1_000));

    let second = store.begin_attempt(&ctx(), &id("m1"), 1_000);
    assert!(matches!(
        second,
        Err(StoreError::StoreConflict { actual: MessageStatus::SendInProgress, .. })
    ));
}

#[test]
fn test_begin_attempt_respects_next_attempt() {
    let (_, store) = make_test_service();
    store
        .save(&ctx(), NewMessage { next_attempt: Some(5_000), ..outbound("m1") }, None)
        .unwrap();

    assert!(store.begin_attempt(&ctx(), &id("m1"), 4_999).unwrap_err().is_conflict());
    assert!(store.begin_attempt(&ctx(), &id("m1"), 5_000).is_ok());
}

#[test]
fn test_concurrent_begin_attempt_has_one_winner() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || store.begin_attempt(&ctx(), &id("m1"), 1_000).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
}

#[test]
fn test_complete_attempt_writes_status_and_attempt_together() {
    let (clock, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();

    store.begin_attempt(&ctx(), &id("m1"), 1_000).unwrap();
    clock.advance(50);
    let after = store
        .complete_attempt(&ctx(), &id("m1"), AttemptCompletion::retry_at(2_000), Some(failed_attempt("m1")))
        .unwrap();
    assert_eq!(after.status, MessageStatus::WaitingForRetry);
    assert_eq!(after.send_attempts, 1);
    assert_eq!(after.next_attempt, Some(2_000));
    assert_eq!(after.attempt_started, None);

    store.begin_attempt(&ctx(), &id("m1"), 2_000).unwrap();
    store
        .complete_attempt(
            &ctx(),
            &id("m1"),
            AttemptCompletion::success().with_notification(NotificationStatus::Notified),
            Some(MessageAttempt::started(id("m1"), 0, 2_000)),
        )
        .unwrap();

    let attempts = store.get_attempts(&ctx(), &id("m1")).unwrap();
    let sequences: Vec<_> = attempts.iter().map(|a| a.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(attempts[0].status, AttemptStatus::Error);

    let done = store.get_message(&ctx(), &id("m1")).unwrap();
    assert_eq!(done.status, MessageStatus::SendSuccess);
    assert_eq!(done.notification_status, NotificationStatus::Notified);
}

#[test]
fn test_completion_after_delete_is_conflict_without_attempt() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    store.begin_attempt(&ctx(), &id("m1"), 1_000).unwrap();

    store.set_message_as_deleted(&ctx(), &id("m1")).unwrap();
    let result = store.complete_attempt(
        &ctx(),
        &id("m1"),
        AttemptCompletion::success(),
        Some(MessageAttempt::started(id("m1"), 0, 1_000)),
    );

    assert!(matches!(
        result,
        Err(StoreError::StoreConflict { actual: MessageStatus::Deleted, .. })
    ));
    assert!(store.get_attempts(&ctx(), &id("m1")).unwrap().is_empty());
}

#[test]
fn test_delete_is_idempotent_and_drops_payload() {
    let (clock, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), Some(vec![1, 2, 3])).unwrap();

    let first = store.set_message_as_deleted(&ctx(), &id("m1")).unwrap();
    clock.advance(10);
    let second = store.set_message_as_deleted(&ctx(), &id("m1")).unwrap();

    assert_eq!(first.status, MessageStatus::Deleted);
    assert_eq!(first, second);
    assert_eq!(store.get_payload(&ctx(), &id("m1")).unwrap(), None);
}

#[test]
fn test_delete_unknown_message() {
    let (_, store) = make_test_service();
    assert!(matches!(
        store.set_message_as_deleted(&ctx(), &id("nope")),
        Err(StoreError::MessageNotFound { .. })
    ));
}

#[test]
fn test_failed_message_queries() {
    let (clock, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    store
        .save(&ctx(), NewMessage { final_recipient: Some("urn:other".into()), ..outbound("m2") }, None)
        .unwrap();
    store.save(&ctx(), outbound("m3"), None).unwrap();

    fail(&store, "m1");
    clock.set(5_000);
    fail(&store, "m2");

    let all = store.get_failed_messages(&ctx(), None).unwrap();
    assert_eq!(all, vec![id("m1"), id("m2")]);
    let for_recipient = store.get_failed_messages(&ctx(), Some("urn:recipient:1")).unwrap();
    assert_eq!(for_recipient, vec![id("m1")]);

    let early = store.find_failed_messages_during_period(&ctx(), 0, 4_999, None).unwrap();
    assert_eq!(early, vec![id("m1")]);

    clock.set(8_000);
    assert_eq!(
        store.get_failed_message_elapsed_time(&ctx(), &id("m2")).unwrap(),
        Duration::from_millis(3_000)
    );
    assert!(matches!(
        store.get_failed_message_elapsed_time(&ctx(), &id("m3")),
        Err(StoreError::NotFailed { status: MessageStatus::SendEnqueued, .. })
    ));
}

#[test]
fn test_restore_transition_resets_failure() {
    let (clock, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    fail(&store, "m1");
    clock.set(9_000);

    let restored = store
        .transition(
            &ctx(),
            &id("m1"),
            &[MessageStatus::SendFailure],
            StatusUpdate::to(MessageStatus::SendEnqueued)
                .with_send_attempts(0)
                .next_attempt_at(9_000)
                .restored(),
        )
        .unwrap();

    assert_eq!(restored.status, MessageStatus::SendEnqueued);
    assert_eq!(restored.send_attempts, 0);
    assert_eq!(restored.attempt_sequence, 1);
    assert_eq!(restored.restored, Some(9_000));
    assert_eq!(restored.scheduled_start(), 9_000);
    assert_eq!(restored.failed, None);

    // Not failed any more.
    assert!(store
        .transition(&ctx(), &id("m1"), &[MessageStatus::SendFailure], StatusUpdate::to(MessageStatus::SendEnqueued))
        .unwrap_err()
        .is_conflict());
}

#[test]
fn test_mark_notified_only_for_current_status() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    let failed = fail(&store, "m1");
    assert_eq!(failed.notification_status, NotificationStatus::Required);

    assert!(store
        .mark_notified(&ctx(), &id("m1"), MessageStatus::SendSuccess)
        .unwrap_err()
        .is_conflict());
    assert_eq!(
        store.get_message(&ctx(), &id("m1")).unwrap().notification_status,
        NotificationStatus::Required
    );

    let notified = store
        .mark_notified(&ctx(), &id("m1"), MessageStatus::SendFailure)
        .unwrap();
    assert_eq!(notified.notification_status, NotificationStatus::Notified);
    assert_eq!(notified.status, MessageStatus::SendFailure);
}

#[test]
fn test_mark_notified_leaves_not_required_alone() {
    let (_, store) = make_test_service();
    let new = NewMessage {
        notification_status: NotificationStatus::NotRequired,
        ..outbound("m1")
    };
    store.save(&ctx(), new, None).unwrap();
    fail(&store, "m1");

    let message = store
        .mark_notified(&ctx(), &id("m1"), MessageStatus::SendFailure)
        .unwrap();
    assert_eq!(message.notification_status, NotificationStatus::NotRequired);
}

#[test]
fn test_transition_moves_message_to_new_group() {
    let (_, store) = make_test_service();
    let first = GroupId::new("group-1").unwrap();
    let second = GroupId::new("group-2").unwrap();
    let new = NewMessage {
        source_message: true,
        group_id: Some(first),
        ..outbound("m1")
    };
    store.save(&ctx(), new, None).unwrap();

    let moved = store
        .transition(
            &ctx(),
            &id("m1"),
            &[MessageStatus::SendEnqueued],
            StatusUpdate::to(MessageStatus::SendEnqueued).with_group(second.clone()),
        )
        .unwrap();
    assert_eq!(moved.group_id, Some(second));
}

#[test]
fn test_attempt_log_is_append_only() {
    let (_, store) = make_test_service();
    store.append_attempt(&ctx(), MessageAttempt::started(id("m1"), 1, 1_000)).unwrap();

    assert!(matches!(
        store.append_attempt(&ctx(), MessageAttempt::started(id("m1"), 1, 2_000)),
        Err(StoreError::AttemptExists { sequence: 1, .. })
    ));
}

#[test]
fn test_find_by_status() {
    let (_, store) = make_test_service();
    store.save(&ctx(), outbound("m1"), None).unwrap();
    store.save(&ctx(), outbound("m2"), None).unwrap();
    store.begin_attempt(&ctx(), &id("m2"), 1_000).unwrap();

    let in_progress = store.find_by_status(&ctx(), &[MessageStatus::SendInProgress]).unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].id, id("m2"));
}

#[test]
fn test_file_backed_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("messages.kv");
    let clock = Arc::new(MockTimeSource::new(1_000));

    {
        let kv = FileBackedKVStore::open(&path).unwrap();
        let store = MessageStoreService::new(kv, clock.clone(), StoreConfig::for_testing());
        store.save(&ctx(), outbound("m1"), Some(b"payload".to_vec())).unwrap();
        store.begin_attempt(&ctx(), &id("m1"), 1_000).unwrap();
    }

    let kv = FileBackedKVStore::open(&path).unwrap();
    let store = MessageStoreService::new(kv, clock, StoreConfig::for_testing());
    let message = store.get_message(&ctx(), &id("m1")).unwrap();
    assert_eq!(message.status, MessageStatus::SendInProgress);
    assert_eq!(store.get_payload(&ctx(), &id("m1")).unwrap(), Some(b"payload".to_vec()));
}
