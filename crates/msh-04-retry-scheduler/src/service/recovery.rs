//! Start-up recovery and periodic maintenance.

use super::RetryScheduler;
use crate::domain::errors::SchedulerError;
use msh_01_message_store::{AttemptCompletion, AttemptStatus, Message, StatusUpdate, StoreError};
use shared_bus::GatewayEvent;
use shared_types::{DomainContext, GroupId, MessageId, MessageStatus};
use tracing::{debug, info, warn};

const INTERRUPTED: &str = "attempt interrupted by restart";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Attempts found in flight and closed as aborted.
    pub interrupted: usize,
    /// Of those, messages that had no attempts left and failed.
    pub failed: usize,
    /// Messages queued again.
    pub rearmed: usize,
    /// Inbound source messages rebuilt from groups left complete.
    pub rejoined: usize,
    /// Terminal messages whose backend notification went out again.
    pub renotified: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_groups: Vec<GroupId>,
    /// Source messages rebuilt from complete groups a rejoin missed.
    pub rejoined: Vec<MessageId>,
    /// Messages whose retry window closed while they were waiting.
    pub expired_messages: Vec<MessageId>,
}

impl RetryScheduler {
    /// Rebuild the in-memory queue from the store after a restart.
    ///
    /// An attempt left `SendInProgress` by a crash counts as made and is
    /// closed as `Abort`. Notifications still owed for finished messages go
    /// out again, and complete inbound groups are rejoined.
    pub async fn recover_pending(&self, ctx: &DomainContext) -> Result<RecoveryReport, SchedulerError> {
        let mut report = RecoveryReport::default();
        let now = self.now();

        let finished = [
            MessageStatus::SendSuccess,
            MessageStatus::SendFailure,
            MessageStatus::Received,
        ];
        for message in self.inner.store.find_by_status(ctx, &finished)? {
            if !message.requires_notification() {
                continue;
            }
            let event = self.owed_notification(ctx, &message);
            self.notify_backend(ctx, &message.id, message.status, event)
                .await;
            report.renotified += 1;
        }

        report.rejoined = self.resume_rejoins(ctx).await?.len();

        for message in self
            .inner
            .store
            .find_by_status(ctx, &[MessageStatus::SendInProgress])?
        {
            let attempt = self.inner.attempts.start(&message);
            let record = self.inner.attempts.end(
                attempt,
                now,
                AttemptStatus::Abort,
                Some(INTERRUPTED.to_string()),
            );
            let exhausted = message.send_attempts.saturating_add(1) >= message.send_attempts_max;
            let notify = message.requires_notification();
            let completion = if exhausted {
                AttemptCompletion::failure()
            } else {
                AttemptCompletion::retry_at(now)
            };

            let completed = match self
                .inner
                .store
                .complete_attempt(ctx, &message.id, completion, record)
            {
                Ok(completed) => completed,
                Err(StoreError::StoreConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            report.interrupted += 1;

            if exhausted {
                report.failed += 1;
                self.after_send_failure(
                    ctx,
                    MessageStatus::SendInProgress,
                    &completed,
                    notify,
                    INTERRUPTED,
                )
                .await;
            } else {
                self.publish_status(
                    ctx,
                    &message.id,
                    MessageStatus::SendInProgress,
                    MessageStatus::WaitingForRetry,
                )
                .await;
                self.arm(ctx, &message.id, now, 0);
                report.rearmed += 1;
            }
        }

        let waiting = [
            MessageStatus::Submitted,
            MessageStatus::SendEnqueued,
            MessageStatus::WaitingForRetry,
        ];
        for message in self.inner.store.find_by_status(ctx, &waiting)? {
            if message.source_message {
                continue;
            }
            self.arm(ctx, &message.id, message.next_attempt.unwrap_or(now), 0);
            report.rearmed += 1;
        }

        info!(
            domain = %ctx.domain(),
            interrupted = report.interrupted,
            failed = report.failed,
            rearmed = report.rearmed,
            rejoined = report.rejoined,
            renotified = report.renotified,
            "[msh-04] Pending messages recovered"
        );
        Ok(report)
    }

    /// The backend event a finished message is still owed.
    fn owed_notification(&self, ctx: &DomainContext, message: &Message) -> GatewayEvent {
        let domain = ctx.domain().clone();
        let message_id = message.id.clone();
        let backend = message.backend_name.clone();
        let fragment_of = message.group_id.clone().filter(|_| message.message_fragment);
        match (message.status, fragment_of) {
            (MessageStatus::SendSuccess, Some(group_id)) => GatewayEvent::MessageFragmentSendSuccess {
                domain,
                message_id,
                group_id,
                backend,
            },
            (MessageStatus::SendSuccess, None) => GatewayEvent::MessageSendSuccess {
                domain,
                message_id,
                backend,
            },
            (MessageStatus::SendFailure, fragment_of) => {
                let error = self
                    .inner
                    .store
                    .get_attempts(ctx, &message.id)
                    .ok()
                    .and_then(|attempts| attempts.into_iter().rev().find_map(|a| a.error))
                    .unwrap_or_else(|| "send failure".to_string());
                match fragment_of {
                    Some(group_id) => GatewayEvent::MessageFragmentSendFailure {
                        domain,
                        message_id,
                        group_id,
                        backend,
                        error,
                    },
                    None => GatewayEvent::MessageSendFailure {
                        domain,
                        message_id,
                        backend,
                        error,
                    },
                }
            }
            _ => GatewayEvent::MessageReceived {
                domain,
                message_id,
                backend,
            },
        }
    }

    /// Rejoin complete inbound groups, expire stale ones and fail waiting
    /// messages whose retry window has closed.
    pub async fn run_maintenance(&self, ctx: &DomainContext) -> Result<MaintenanceReport, SchedulerError> {
        let now = self.now();
        let rejoined = self.resume_rejoins(ctx).await?;
        let mut report = MaintenanceReport {
            expired_groups: self.inner.fragments.expire_stale_groups(ctx, now)?,
            rejoined,
            ..MaintenanceReport::default()
        };
        for group_id in &report.expired_groups {
            self.mark_reception_failed(ctx, group_id).await;
            self.publish(GatewayEvent::RejoinFailed {
                domain: ctx.domain().clone(),
                group_id: group_id.clone(),
                error: "join interval elapsed".to_string(),
            })
            .await;
        }

        for message in self
            .inner
            .store
            .find_by_status(ctx, &[MessageStatus::WaitingForRetry])?
        {
            let leg = match self.inner.legs.resolve(ctx, &message.id) {
                Ok(leg) => leg,
                Err(e) => {
                    debug!(message_id = %message.id, error = %e, "[msh-04] No leg during maintenance");
                    continue;
                }
            };
            if leg
                .reception_awareness
                .window_open(message.scheduled_start(), now)
            {
                continue;
            }

            let notify = message.requires_notification();
            match self.inner.store.transition(
                ctx,
                &message.id,
                &[MessageStatus::WaitingForRetry],
                StatusUpdate::to(MessageStatus::SendFailure),
            ) {
                Ok(failed) => {
                    self.after_send_failure(
                        ctx,
                        MessageStatus::WaitingForRetry,
                        &failed,
                        notify,
                        "retry window closed",
                    )
                    .await;
                    report.expired_messages.push(message.id);
                }
                Err(StoreError::StoreConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if !report.expired_groups.is_empty() || !report.expired_messages.is_empty() {
            warn!(
                domain = %ctx.domain(),
                expired_groups = report.expired_groups.len(),
                expired_messages = report.expired_messages.len(),
                "[msh-04] Maintenance expired work"
            );
        }
        Ok(report)
    }
}
