//! Bus publishing and the shared failure tail.

use super::RetryScheduler;
use msh_01_message_store::{Message, StatusUpdate};
use shared_bus::GatewayEvent;
use shared_types::{DomainContext, GroupId, MessageId, MessageStatus};
use tracing::{debug, warn};

impl RetryScheduler {
    pub(crate) async fn publish(&self, event: GatewayEvent) {
        let receivers = self.inner.events.publish(event).await;
        if receivers == 0 {
            debug!("[msh-04] Event published without subscribers");
        }
    }

    /// Hand a backend notification to the bus. The message is marked
    /// `Notified` only once a subscriber took the event; otherwise it stays
    /// `Required` and `recover_pending` sends it again.
    pub(crate) async fn notify_backend(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        status: MessageStatus,
        event: GatewayEvent,
    ) {
        let receivers = self.inner.events.publish(event).await;
        if receivers == 0 {
            debug!(message_id = %id, "[msh-04] Notification kept pending, no subscribers");
            return;
        }
        if let Err(e) = self.inner.store.mark_notified(ctx, id, status) {
            debug!(message_id = %id, error = %e, "[msh-04] Notification not recorded");
        }
    }

    pub(crate) async fn publish_status(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        from: MessageStatus,
        to: MessageStatus,
    ) {
        if from == to {
            return;
        }
        self.publish(GatewayEvent::MessageStatusChanged {
            domain: ctx.domain().clone(),
            message_id: id.clone(),
            from,
            to,
            at: self.now(),
        })
        .await;
    }

    /// Everything that follows a message becoming `SendFailure`.
    ///
    /// `notify` is whether the backend is still owed a notification.
    pub(crate) async fn after_send_failure(
        &self,
        ctx: &DomainContext,
        from: MessageStatus,
        failed: &Message,
        notify: bool,
        error: &str,
    ) {
        self.inner.legs.invalidate(ctx, &failed.id);
        self.publish_status(ctx, &failed.id, from, MessageStatus::SendFailure)
            .await;
        warn!(
            domain = %ctx.domain(),
            message_id = %failed.id,
            attempts = failed.send_attempts,
            error = %error,
            "[msh-04] Message failed"
        );

        if self.inner.config.delete_payload_on_send_failure {
            if let Err(e) = self.inner.store.clear_payload(ctx, &failed.id) {
                warn!(message_id = %failed.id, error = %e, "[msh-04] Could not drop payload");
            }
        }

        match (&failed.group_id, failed.message_fragment) {
            (Some(group_id), true) => {
                if notify {
                    self.notify_backend(
                        ctx,
                        &failed.id,
                        MessageStatus::SendFailure,
                        GatewayEvent::MessageFragmentSendFailure {
                            domain: ctx.domain().clone(),
                            message_id: failed.id.clone(),
                            group_id: group_id.clone(),
                            backend: failed.backend_name.clone(),
                            error: error.to_string(),
                        },
                    )
                    .await;
                }
                self.fail_split_message(ctx, &failed.id, group_id, error).await;
            }
            _ => {
                if notify {
                    self.notify_backend(
                        ctx,
                        &failed.id,
                        MessageStatus::SendFailure,
                        GatewayEvent::MessageSendFailure {
                            domain: ctx.domain().clone(),
                            message_id: failed.id.clone(),
                            backend: failed.backend_name.clone(),
                            error: error.to_string(),
                        },
                    )
                    .await;
                }
            }
        }
    }

    /// One fragment failed for good: the group, its source message and every
    /// sibling still waiting to go out fail with it.
    async fn fail_split_message(
        &self,
        ctx: &DomainContext,
        fragment_id: &MessageId,
        group_id: &GroupId,
        error: &str,
    ) {
        let group = match self.inner.fragments.on_fragment_failed(ctx, fragment_id) {
            Ok(group) => group,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "[msh-04] Could not fail group");
                return;
            }
        };

        let source_id = group.source_message_id.clone();
        if let Ok(Some(source)) = self.inner.store.find_message(ctx, &source_id) {
            let notify = source.requires_notification();
            match self.inner.store.transition(
                ctx,
                &source_id,
                &[MessageStatus::SendEnqueued],
                StatusUpdate::to(MessageStatus::SendFailure),
            ) {
                Ok(failed) => {
                    self.publish_status(
                        ctx,
                        &source_id,
                        MessageStatus::SendEnqueued,
                        MessageStatus::SendFailure,
                    )
                    .await;
                    if notify {
                        self.notify_backend(
                            ctx,
                            &source_id,
                            MessageStatus::SendFailure,
                            GatewayEvent::MessageSendFailure {
                                domain: ctx.domain().clone(),
                                message_id: source_id.clone(),
                                backend: failed.backend_name.clone(),
                                error: format!("fragment {} failed: {}", fragment_id, error),
                            },
                        )
                        .await;
                    }
                }
                Err(e) => debug!(message_id = %source_id, error = %e, "[msh-04] Source not failed"),
            }
        }

        let siblings = match self.inner.fragments.get_fragments(ctx, group_id) {
            Ok(siblings) => siblings,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "[msh-04] Could not list fragments");
                return;
            }
        };
        for sibling in siblings.iter().filter(|f| &f.message_id != fragment_id) {
            let waiting = [
                MessageStatus::Submitted,
                MessageStatus::SendEnqueued,
                MessageStatus::WaitingForRetry,
            ];
            let before = match self.inner.store.find_message(ctx, &sibling.message_id) {
                Ok(Some(message)) => message.status,
                _ => continue,
            };
            if self
                .inner
                .store
                .transition(
                    ctx,
                    &sibling.message_id,
                    &waiting,
                    StatusUpdate::to(MessageStatus::SendFailure),
                )
                .is_ok()
            {
                self.publish_status(ctx, &sibling.message_id, before, MessageStatus::SendFailure)
                    .await;
            }
        }
    }
}
