//! # Split-and-Join Between Two Gateways
//!
//! Blue cuts a large message into fragments; a loopback transport hands
//! each fragment to red, which rejoins the source message.

use super::gateway::{domain, gateway, id, routing, GatewayOptions, TestGateway};
use async_trait::async_trait;
use msh_02_leg_configuration::LegConfiguration;
use msh_03_split_and_join::{GroupState, MimePart, SourceMessage};
use msh_04_retry_scheduler::{
    DispatchAdapter, DispatchFailure, DispatchOutcome, FailureKind, InboundFragment,
    OutboundMessage, RetryScheduler, Submission,
};
use parking_lot::Mutex;
use rand::Rng;
use shared_bus::{EventFilter, EventTopic, GatewayEvent};
use shared_types::{DomainContext, MessageStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delivers fragments straight into a peer gateway.
#[derive(Default)]
struct LoopbackTransport {
    peer: Mutex<Option<RetryScheduler>>,
    fragments: AtomicUsize,
}

impl LoopbackTransport {
    fn connect(&self, peer: RetryScheduler) {
        *self.peer.lock() = Some(peer);
    }
}

#[async_trait]
impl DispatchAdapter for LoopbackTransport {
    async fn send(
        &self,
        ctx: &DomainContext,
        message: &OutboundMessage,
        leg: &LegConfiguration,
        _timeout: Duration,
    ) -> DispatchOutcome {
        let Some(fragment) = &message.fragment else {
            return DispatchOutcome::delivered();
        };
        let Some(peer) = self.peer.lock().clone() else {
            return DispatchOutcome::Failed(DispatchFailure::retryable(
                FailureKind::Connection,
                "peer not connected",
            ));
        };

        let inbound = InboundFragment {
            message_id: message.message_id.clone(),
            group_id: fragment.group_id.clone(),
            source_message_id: fragment.source_message_id.clone(),
            fragment_number: fragment.fragment_number,
            fragment_count: fragment.fragment_count,
            compressed: fragment.compressed,
            source_content_type: fragment.source_content_type.clone(),
            join_interval_ms: leg.splitting.as_ref().map_or(0, |s| s.join_interval_ms),
            routing: message.routing.clone(),
            backend_name: "backendWebservice".into(),
            payload: message.payload.clone(),
        };
        match peer.accept_inbound_fragment(ctx, inbound).await {
            Ok(_) => {
                self.fragments.fetch_add(1, Ordering::SeqCst);
                DispatchOutcome::Delivered {
                    response: Some(b"<eb:Receipt/>".to_vec()),
                }
            }
            Err(e) => DispatchOutcome::Failed(DispatchFailure::fatal(
                FailureKind::Rejected,
                e.to_string(),
            )),
        }
    }
}

/// A MIME message whose attachment does not compress away.
fn large_document(attachment_len: usize) -> (String, Vec<u8>) {
    let mut rng = rand::thread_rng();
    let attachment: Vec<u8> = (0..attachment_len).map(|_| rng.gen()).collect();
    let envelope = MimePart::new("application/soap+xml", b"<env:Envelope/>".to_vec());
    let attachment =
        MimePart::new("application/octet-stream", attachment).with_content_id("invoice@blue");
    SourceMessage::to_mime(&envelope, &[attachment], "msh-boundary-large")
}

struct Pair {
    blue: TestGateway,
    red: TestGateway,
    transport: Arc<LoopbackTransport>,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

fn pair() -> Pair {
    let blue_dir = tempfile::tempdir().unwrap();
    let red_dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(LoopbackTransport::default());
    let blue = gateway(blue_dir.path(), transport.clone(), GatewayOptions::default());
    let red = gateway(
        red_dir.path(),
        Arc::new(LoopbackTransport::default()),
        GatewayOptions::default(),
    );
    transport.connect(red.scheduler.clone());
    Pair {
        blue,
        red,
        transport,
        _dirs: (blue_dir, red_dir),
    }
}

#[tokio::test]
async fn test_large_message_rejoined_by_peer() {
    let p = pair();
    let ctx = domain("default");
    let mut rejoined = p
        .red
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::SplitAndJoin]));
    let (content_type, body) = large_document(3_000);

    let source_id = p
        .blue
        .scheduler
        .submit(
            &ctx,
            Submission::new(routing("LargeDoc"), body.clone())
                .with_message_id(id("invoice-1@blue"))
                .with_content_type(content_type.clone()),
        )
        .await
        .unwrap();

    let sent = p
        .blue
        .wait_for_status(&ctx, &source_id, MessageStatus::SendSuccess)
        .await;
    let group_id = sent.group_id.unwrap();
    let group = p.blue.fragments.get_message_group(&ctx, &group_id).unwrap();
    assert_eq!(group.state, GroupState::Sent);
    assert!(group.compressed);
    assert_eq!(
        p.transport.fragments.load(Ordering::SeqCst),
        group.fragment_count as usize
    );

    let received = p
        .red
        .wait_for_status(&ctx, &source_id, MessageStatus::Received)
        .await;
    assert!(received.source_message);
    assert_eq!(received.content_type, content_type);
    assert_eq!(p.red.store.get_payload(&ctx, &source_id).unwrap(), Some(body));

    let event = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rejoined.recv().await {
                Some(event @ GatewayEvent::SourceMessageRejoined { .. }) => return event,
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        event,
        GatewayEvent::SourceMessageRejoined { ref message_id, .. } if message_id == &source_id
    ));
}

#[tokio::test]
async fn test_fragments_fail_when_peer_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(LoopbackTransport::default());
    let blue = gateway(dir.path(), transport.clone(), GatewayOptions::default());
    let ctx = domain("default");
    let (content_type, body) = large_document(2_000);

    let source_id = blue
        .scheduler
        .submit(
            &ctx,
            Submission::new(routing("LargeDoc"), body)
                .with_message_id(id("invoice-2@blue"))
                .with_content_type(content_type),
        )
        .await
        .unwrap();

    // pushLarge has no retries: the first refused fragment fails the group
    let failed = blue
        .wait_for_status(&ctx, &source_id, MessageStatus::SendFailure)
        .await;
    let group = blue
        .fragments
        .get_message_group(&ctx, &failed.group_id.unwrap())
        .unwrap();
    assert_eq!(group.state, GroupState::Failed);
    assert_eq!(transport.fragments.load(Ordering::SeqCst), 0);
}
