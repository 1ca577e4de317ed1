//! One attempt, from claim to completion.

use super::{InFlight, RetryScheduler};
use crate::domain::dispatch::{
    DispatchFailure, DispatchOutcome, FailureKind, FragmentInfo, OutboundMessage,
};
use crate::domain::errors::SchedulerError;
use crate::domain::retry::{self, RetryDecision};
use crate::domain::submission::AttemptReport;
use msh_01_message_store::{
    AttemptCompletion, AttemptStatus, Message, MessageAttempt, StatusUpdate, StoreError,
};
use msh_02_leg_configuration::{LegConfiguration, RetryPolicy};
use shared_bus::GatewayEvent;
use shared_types::{DomainContext, MessageId, MessageStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl RetryScheduler {
    /// Run one attempt for `id` now, if it is due.
    pub async fn attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<AttemptReport, SchedulerError> {
        self.run_attempt(ctx, id, 0).await
    }

    pub(crate) async fn run_attempt(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        lookup_retries: u32,
    ) -> Result<AttemptReport, SchedulerError> {
        if self.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown);
        }

        let Some(current) = self.inner.store.find_message(ctx, id)? else {
            self.retry_lookup(ctx, id, lookup_retries);
            return Ok(AttemptReport::Skipped);
        };
        if current.source_message || !current.status.is_schedulable() {
            debug!(message_id = %id, status = %current.status, "[msh-04] Nothing to send");
            return Ok(AttemptReport::Skipped);
        }
        if let Some(at) = current.next_attempt {
            if at > self.now() {
                self.arm(ctx, id, at, 0);
                return Ok(AttemptReport::Skipped);
            }
        }

        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| SchedulerError::ShuttingDown)?;

        let message = match self.inner.store.begin_attempt(ctx, id, self.now()) {
            Ok(message) => message,
            Err(StoreError::StoreConflict { actual, .. }) => {
                debug!(message_id = %id, status = %actual, "[msh-04] Attempt lost the claim");
                return Ok(AttemptReport::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        let _in_flight = InFlight::enter(&self.inner.in_flight);
        self.publish_status(ctx, id, current.status, MessageStatus::SendInProgress)
            .await;

        self.dispatch(ctx, message).await
    }

    /// Re-queue a message that is not visible yet.
    pub(crate) fn retry_lookup(&self, ctx: &DomainContext, id: &MessageId, lookup_retries: u32) {
        if lookup_retries < self.inner.config.max_lookup_retries {
            debug!(message_id = %id, lookup_retries, "[msh-04] Message not found, re-queued");
            let at = self
                .now()
                .saturating_add(self.inner.config.lookup_retry_delay.as_millis() as u64);
            self.arm(ctx, id, at, lookup_retries + 1);
        } else {
            warn!(
                domain = %ctx.domain(),
                message_id = %id,
                lookup_retries,
                "[msh-04] Message not found, giving up"
            );
        }
    }

    async fn dispatch(
        &self,
        ctx: &DomainContext,
        message: Message,
    ) -> Result<AttemptReport, SchedulerError> {
        let attempt = self.inner.attempts.start(&message);

        let leg = match self.inner.legs.resolve(ctx, &message.id) {
            Ok(leg) => leg,
            Err(e) => {
                let failure = DispatchFailure::fatal(FailureKind::Configuration, e.to_string());
                return self.finish_failed(ctx, &message, attempt, failure, None).await;
            }
        };

        let outbound = match self.outbound_message(ctx, &message, &leg) {
            Ok(outbound) => outbound,
            Err(failure) => {
                return self
                    .finish_failed(ctx, &message, attempt, failure, Some(&leg.reception_awareness))
                    .await;
            }
        };

        self.inner
            .recorder
            .record_request(ctx, &message.id, &outbound.payload);

        let timeout = leg.dispatch_timeout();
        let outcome = match tokio::time::timeout(
            timeout,
            self.inner.dispatcher.send(ctx, &outbound, &leg, timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome::Failed(DispatchFailure::timeout(timeout)),
        };

        match outcome {
            DispatchOutcome::Delivered { response } => {
                if let Some(response) = &response {
                    self.inner.recorder.record_response(ctx, &message.id, response);
                }
                self.finish_delivered(ctx, &message, attempt).await
            }
            DispatchOutcome::Failed(failure) => {
                self.finish_failed(ctx, &message, attempt, failure, Some(&leg.reception_awareness))
                    .await
            }
        }
    }

    fn outbound_message(
        &self,
        ctx: &DomainContext,
        message: &Message,
        leg: &Arc<LegConfiguration>,
    ) -> Result<OutboundMessage, DispatchFailure> {
        let missing = |detail: String| DispatchFailure::fatal(FailureKind::Configuration, detail);

        let (payload, fragment) = if message.message_fragment {
            let entity = self
                .inner
                .fragments
                .fragment_for_message(ctx, &message.id)
                .map_err(|e| missing(e.to_string()))?
                .ok_or_else(|| missing(format!("no fragment record for {}", message.id)))?;
            let group = self
                .inner
                .fragments
                .get_message_group(ctx, &entity.group_id)
                .map_err(|e| missing(e.to_string()))?;
            let payload = self
                .inner
                .fragments
                .read_fragment_payload(ctx, &message.id)
                .map_err(|e| missing(e.to_string()))?;
            let info = FragmentInfo {
                group_id: entity.group_id,
                source_message_id: group.source_message_id,
                fragment_number: entity.fragment_number,
                fragment_count: group.fragment_count,
                compressed: group.compressed,
                source_content_type: group.content_type,
            };
            (payload, Some(info))
        } else {
            let payload = self
                .inner
                .store
                .get_payload(ctx, &message.id)
                .map_err(|e| DispatchFailure::retryable(FailureKind::Internal, e.to_string()))?
                .ok_or_else(|| missing(format!("payload of {} is gone", message.id)))?;
            (payload, None)
        };

        Ok(OutboundMessage {
            message_id: message.id.clone(),
            routing: message.routing.clone(),
            mpc: message.mpc.clone(),
            content_type: message.content_type.clone(),
            payload,
            endpoint: leg.endpoint.clone(),
            fragment,
        })
    }

    async fn finish_delivered(
        &self,
        ctx: &DomainContext,
        message: &Message,
        attempt: MessageAttempt,
    ) -> Result<AttemptReport, SchedulerError> {
        let notify = message.requires_notification();
        let completion = AttemptCompletion::success();
        let record = self
            .inner
            .attempts
            .end(attempt, self.now(), AttemptStatus::Success, None);

        let delivered = match self
            .inner
            .store
            .complete_attempt(ctx, &message.id, completion, record)
        {
            Ok(delivered) => delivered,
            Err(StoreError::StoreConflict { actual, .. }) => {
                info!(message_id = %message.id, status = %actual, "[msh-04] Delivery outcome discarded");
                return Ok(AttemptReport::Cancelled);
            }
            Err(e) => return Err(e.into()),
        };

        self.inner.legs.invalidate(ctx, &message.id);
        self.publish_status(
            ctx,
            &message.id,
            MessageStatus::SendInProgress,
            MessageStatus::SendSuccess,
        )
        .await;
        info!(
            domain = %ctx.domain(),
            message_id = %message.id,
            attempts = delivered.send_attempts,
            "[msh-04] Message sent"
        );

        match (&delivered.group_id, delivered.message_fragment) {
            (Some(group_id), true) => {
                if notify {
                    self.notify_backend(
                        ctx,
                        &delivered.id,
                        MessageStatus::SendSuccess,
                        GatewayEvent::MessageFragmentSendSuccess {
                            domain: ctx.domain().clone(),
                            message_id: delivered.id.clone(),
                            group_id: group_id.clone(),
                            backend: delivered.backend_name.clone(),
                        },
                    )
                    .await;
                }
                self.on_fragment_delivered(ctx, &delivered.id).await?;
            }
            _ => {
                if notify {
                    self.notify_backend(
                        ctx,
                        &delivered.id,
                        MessageStatus::SendSuccess,
                        GatewayEvent::MessageSendSuccess {
                            domain: ctx.domain().clone(),
                            message_id: delivered.id.clone(),
                            backend: delivered.backend_name.clone(),
                        },
                    )
                    .await;
                }
            }
        }
        Ok(AttemptReport::Delivered)
    }

    /// The source message succeeds once the last fragment is out.
    async fn on_fragment_delivered(
        &self,
        ctx: &DomainContext,
        fragment_id: &MessageId,
    ) -> Result<(), SchedulerError> {
        let group = self.inner.fragments.on_fragment_sent(ctx, fragment_id)?;
        if group.state != msh_03_split_and_join::GroupState::Sent {
            return Ok(());
        }

        let source_id = group.source_message_id;
        let Some(source) = self.inner.store.find_message(ctx, &source_id)? else {
            return Ok(());
        };
        let notify = source.requires_notification();
        match self.inner.store.transition(
            ctx,
            &source_id,
            &[MessageStatus::SendEnqueued],
            StatusUpdate::to(MessageStatus::SendSuccess),
        ) {
            Ok(sent) => {
                self.publish_status(
                    ctx,
                    &source_id,
                    MessageStatus::SendEnqueued,
                    MessageStatus::SendSuccess,
                )
                .await;
                info!(
                    domain = %ctx.domain(),
                    message_id = %source_id,
                    fragments = group.fragment_count,
                    "[msh-04] Source message sent"
                );
                if notify {
                    self.notify_backend(
                        ctx,
                        &source_id,
                        MessageStatus::SendSuccess,
                        GatewayEvent::MessageSendSuccess {
                            domain: ctx.domain().clone(),
                            message_id: source_id.clone(),
                            backend: sent.backend_name,
                        },
                    )
                    .await;
                }
                Ok(())
            }
            Err(StoreError::StoreConflict { actual, .. }) => {
                debug!(message_id = %source_id, status = %actual, "[msh-04] Source left alone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a failed attempt and either queue the retry or give up.
    ///
    /// `policy` is `None` when no leg could be resolved.
    async fn finish_failed(
        &self,
        ctx: &DomainContext,
        message: &Message,
        attempt: MessageAttempt,
        failure: DispatchFailure,
        policy: Option<&RetryPolicy>,
    ) -> Result<AttemptReport, SchedulerError> {
        let now = self.now();
        let decision = match policy {
            Some(policy) => retry::decide(message, policy, failure.retryable, now),
            None => RetryDecision::GiveUp(retry::GiveUpReason::NotRetryable),
        };
        let status = match failure.kind {
            FailureKind::Timeout => AttemptStatus::Abort,
            _ => AttemptStatus::Error,
        };
        let record = self
            .inner
            .attempts
            .end(attempt, now, status, Some(failure.to_string()));

        match decision {
            RetryDecision::RetryAt(at) => {
                match self.inner.store.complete_attempt(
                    ctx,
                    &message.id,
                    AttemptCompletion::retry_at(at),
                    record,
                ) {
                    Ok(_) => {}
                    Err(StoreError::StoreConflict { actual, .. }) => {
                        info!(message_id = %message.id, status = %actual, "[msh-04] Failed attempt discarded");
                        return Ok(AttemptReport::Cancelled);
                    }
                    Err(e) => return Err(e.into()),
                }
                self.publish_status(
                    ctx,
                    &message.id,
                    MessageStatus::SendInProgress,
                    MessageStatus::WaitingForRetry,
                )
                .await;
                info!(
                    domain = %ctx.domain(),
                    message_id = %message.id,
                    error = %failure,
                    retry_at = at,
                    "[msh-04] Attempt failed, retry scheduled"
                );
                self.arm(ctx, &message.id, at, 0);
                Ok(AttemptReport::Retrying { at })
            }
            RetryDecision::GiveUp(reason) => {
                let notify = message.requires_notification();
                let failed = match self.inner.store.complete_attempt(
                    ctx,
                    &message.id,
                    AttemptCompletion::failure(),
                    record,
                ) {
                    Ok(failed) => failed,
                    Err(StoreError::StoreConflict { actual, .. }) => {
                        info!(message_id = %message.id, status = %actual, "[msh-04] Failed attempt discarded");
                        return Ok(AttemptReport::Cancelled);
                    }
                    Err(e) => return Err(e.into()),
                };
                let error = format!("{} ({})", failure, reason);
                self.after_send_failure(ctx, MessageStatus::SendInProgress, &failed, notify, &error)
                    .await;
                Ok(AttemptReport::Failed)
            }
        }
    }
}
