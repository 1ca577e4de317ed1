//! # Delivery Flows
//!
//! Store → leg resolver → scheduler → transport → non-repudiation, with the
//! backend notifications that come out of it.

use super::gateway::{domain, gateway, gateway_over, id, routing, GatewayOptions};
use msh_01_message_store::{AttemptStatus, MessageStoreApi};
use msh_04_retry_scheduler::{
    DispatchFailure, DispatchOutcome, FailureKind, SchedulerError, ScriptedDispatchAdapter,
    Submission,
};
use msh_05_non_repudiation::{EnvelopeKind, NonRepudiationConfig};
use shared_bus::{EventFilter, EventTopic, GatewayEvent};
use shared_types::{FileBackedKVStore, MessageStatus};
use std::sync::Arc;
use std::time::Duration;

fn connection_refused() -> DispatchOutcome {
    DispatchOutcome::Failed(DispatchFailure::retryable(
        FailureKind::Connection,
        "connection refused",
    ))
}

fn receipt() -> DispatchOutcome {
    DispatchOutcome::Delivered {
        response: Some(b"<eb:Receipt/>".to_vec()),
    }
}

fn submission(message_id: &str) -> Submission {
    Submission::new(routing("TC1Leg1"), b"<env:Envelope>order</env:Envelope>".to_vec())
        .with_message_id(id(message_id))
        .from_backend("backendWebservice")
}

#[tokio::test]
async fn test_retry_then_delivery_leaves_full_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(ScriptedDispatchAdapter::delivering());
    adapter.push(connection_refused());
    adapter.push(receipt());
    let gw = gateway(dir.path(), adapter.clone(), GatewayOptions::default());
    let ctx = domain("default");
    let mut notifications = gw
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::BackendNotification]));

    let message_id = gw.scheduler.submit(&ctx, submission("order-1@blue")).await.unwrap();
    let sent = gw
        .wait_for_status(&ctx, &message_id, MessageStatus::SendSuccess)
        .await;

    assert_eq!(sent.send_attempts, 2);
    assert_eq!(adapter.calls_for(&message_id).len(), 2);

    let history = gw.scheduler.get_attempts_history(&ctx, &message_id).unwrap();
    let statuses: Vec<AttemptStatus> = history.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![AttemptStatus::Error, AttemptStatus::Success]);

    let envelopes = gw.non_repudiation.get_envelopes(&ctx, &message_id).unwrap();
    let kinds: Vec<EnvelopeKind> = envelopes.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EnvelopeKind::Request, EnvelopeKind::Request, EnvelopeKind::Response]
    );
    assert_eq!(envelopes[2].raw, b"<eb:Receipt/>".to_vec());

    let event = tokio::time::timeout(Duration::from_secs(3), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        GatewayEvent::MessageSendSuccess { ref message_id, ref backend, .. }
            if message_id == &id("order-1@blue") && backend == "backendWebservice"
    ));
}

#[tokio::test]
async fn test_exhausted_message_restored_by_operator() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(ScriptedDispatchAdapter::with_fallback(connection_refused()));
    let gw = gateway(dir.path(), adapter.clone(), GatewayOptions::default());
    let ctx = domain("default");

    let message_id = gw.scheduler.submit(&ctx, submission("order-2@blue")).await.unwrap();
    let failed = gw
        .wait_for_status(&ctx, &message_id, MessageStatus::SendFailure)
        .await;
    assert_eq!(failed.send_attempts, 3);
    assert_eq!(
        gw.scheduler.get_failed_messages(&ctx, None).unwrap(),
        vec![message_id.clone()]
    );

    adapter.push(receipt());
    gw.scheduler
        .restore_failed_message(&ctx, &message_id)
        .await
        .unwrap();
    let restored = gw
        .wait_for_status(&ctx, &message_id, MessageStatus::SendSuccess)
        .await;

    assert!(restored.restored.is_some());
    assert_eq!(restored.send_attempts, 1);
    assert_eq!(gw.scheduler.get_attempts_history(&ctx, &message_id).unwrap().len(), 4);
    assert!(gw.scheduler.get_failed_messages(&ctx, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_domains_do_not_share_messages() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(ScriptedDispatchAdapter::delivering());
    let gw = gateway(
        dir.path(),
        adapter.clone(),
        GatewayOptions {
            domains: vec!["blue", "red"],
            ..GatewayOptions::default()
        },
    );
    let blue = domain("blue");
    let red = domain("red");

    gw.scheduler.submit(&blue, submission("shared@blue")).await.unwrap();
    gw.scheduler.submit(&red, submission("shared@blue")).await.unwrap();
    gw.wait_for_status(&blue, &id("shared@blue"), MessageStatus::SendSuccess)
        .await;
    gw.wait_for_status(&red, &id("shared@blue"), MessageStatus::SendSuccess)
        .await;

    gw.scheduler
        .delete_message(&red, &id("shared@blue"))
        .await
        .unwrap();

    assert_eq!(
        gw.store.get_message(&red, &id("shared@blue")).unwrap().status,
        MessageStatus::Deleted
    );
    assert_eq!(
        gw.store.get_message(&blue, &id("shared@blue")).unwrap().status,
        MessageStatus::SendSuccess
    );
    assert_eq!(
        gw.non_repudiation
            .get_envelopes(&blue, &id("shared@blue"))
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_domain_without_pmode_rejects_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(ScriptedDispatchAdapter::delivering());
    let gw = gateway(dir.path(), adapter.clone(), GatewayOptions::default());
    let green = domain("green");

    let result = gw.scheduler.submit(&green, submission("order-3@blue")).await;

    assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    assert!(gw.store.find_message(&green, &id("order-3@blue")).unwrap().is_none());
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn test_audit_off_keeps_no_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(ScriptedDispatchAdapter::delivering());
    adapter.push(receipt());
    let gw = gateway(
        dir.path(),
        adapter.clone(),
        GatewayOptions {
            non_repudiation: NonRepudiationConfig::disabled(),
            attempt_audit: false,
            ..GatewayOptions::default()
        },
    );
    let ctx = domain("default");

    let message_id = gw.scheduler.submit(&ctx, submission("order-4@blue")).await.unwrap();
    let sent = gw
        .wait_for_status(&ctx, &message_id, MessageStatus::SendSuccess)
        .await;

    assert_eq!(sent.send_attempts, 1);
    assert!(gw.scheduler.get_attempts_history(&ctx, &message_id).unwrap().is_empty());
    assert!(!gw.non_repudiation.has_envelopes(&ctx, &message_id).unwrap());
}

#[tokio::test]
async fn test_restart_resumes_waiting_message() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("messages.db");
    let ctx = domain("default");

    let first_run = Arc::new(ScriptedDispatchAdapter::with_fallback(connection_refused()));
    let (message_id, attempts_before) = {
        let gw = gateway_over(
            dir.path(),
            Box::new(FileBackedKVStore::open(&db).unwrap()),
            first_run.clone(),
            GatewayOptions::default(),
        );
        let message_id = gw.scheduler.submit(&ctx, submission("order-5@blue")).await.unwrap();
        gw.wait_for_status(&ctx, &message_id, MessageStatus::WaitingForRetry)
            .await;
        gw.scheduler.shutdown().await;
        let attempts = gw.store.get_message(&ctx, &message_id).unwrap().send_attempts;
        (message_id, attempts)
    };
    assert_eq!(first_run.calls_for(&message_id).len() as u32, attempts_before);

    let second_run = Arc::new(ScriptedDispatchAdapter::delivering());
    let gw = gateway_over(
        dir.path(),
        Box::new(FileBackedKVStore::open(&db).unwrap()),
        second_run.clone(),
        GatewayOptions::default(),
    );
    let report = gw.scheduler.recover_pending(&ctx).await.unwrap();
    assert_eq!(report.rearmed, 1);
    assert_eq!(report.interrupted, 0);

    let sent = gw
        .wait_for_status(&ctx, &message_id, MessageStatus::SendSuccess)
        .await;
    assert_eq!(sent.send_attempts, attempts_before + 1);
    assert_eq!(second_run.calls_for(&message_id).len(), 1);
}
