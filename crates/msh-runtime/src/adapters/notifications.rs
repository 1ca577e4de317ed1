//! # Notification Logger
//!
//! Stands in for a backend connector: subscribes to every gateway event and
//! writes it to the log until shutdown.

use shared_bus::{EventFilter, GatewayEvent, InMemoryEventBus, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub fn spawn_notification_logger(
    bus: &InMemoryEventBus,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    let subscription = bus.subscribe(EventFilter::all());
    tokio::spawn(run(subscription, shutdown))
}

/// Returns the number of events logged.
async fn run(mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) -> u64 {
    info!("[msh-runtime] Notification logger started");
    let mut logged = 0u64;

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    log_event(&event);
                    logged += 1;
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Whatever was published before the signal still gets logged.
    while let Ok(Some(event)) = subscription.try_recv() {
        log_event(&event);
        logged += 1;
    }
    info!(logged, "[msh-runtime] Notification logger stopped");
    logged
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::MessageStatusChanged {
            domain,
            message_id,
            from,
            to,
            ..
        } => debug!(%domain, %message_id, %from, %to, "[msh-runtime] Status changed"),
        GatewayEvent::MessageSendSuccess {
            domain,
            message_id,
            backend,
        } => info!(%domain, %message_id, backend, "[msh-runtime] Message sent"),
        GatewayEvent::MessageSendFailure {
            domain,
            message_id,
            backend,
            error,
        } => warn!(%domain, %message_id, backend, error, "[msh-runtime] Message send failed"),
        GatewayEvent::MessageReceived {
            domain,
            message_id,
            backend,
        } => info!(%domain, %message_id, backend, "[msh-runtime] Message received"),
        GatewayEvent::MessageFragmentSendSuccess {
            domain,
            message_id,
            group_id,
            backend,
        } => info!(%domain, %message_id, %group_id, backend, "[msh-runtime] Fragment sent"),
        GatewayEvent::MessageFragmentSendFailure {
            domain,
            message_id,
            group_id,
            backend,
            error,
        } => warn!(
            %domain,
            %message_id,
            %group_id,
            backend,
            error,
            "[msh-runtime] Fragment send failed"
        ),
        GatewayEvent::SourceMessageRejoined {
            domain,
            group_id,
            message_id,
        } => info!(%domain, %group_id, %message_id, "[msh-runtime] Source message rejoined"),
        GatewayEvent::RejoinFailed {
            domain,
            group_id,
            error,
        } => warn!(%domain, %group_id, error, "[msh-runtime] Rejoin failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::EventPublisher;
    use shared_types::{DomainId, MessageId};

    fn sent(id: &str) -> GatewayEvent {
        GatewayEvent::MessageSendSuccess {
            domain: DomainId::default_domain(),
            message_id: MessageId::new(id).unwrap(),
            backend: "fs-plugin".into(),
        }
    }

    #[tokio::test]
    async fn test_logs_until_shutdown() {
        let bus = InMemoryEventBus::new();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_notification_logger(&bus, rx);

        bus.publish(sent("m1@blue")).await;
        bus.publish(sent("m2@blue")).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let bus = InMemoryEventBus::new();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_notification_logger(&bus, rx);

        drop(tx);

        assert_eq!(handle.await.unwrap(), 0);
    }
}
