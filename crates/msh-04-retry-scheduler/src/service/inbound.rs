//! Receiving fragments and rebuilding their source message.

use super::RetryScheduler;
use crate::domain::errors::SchedulerError;
use crate::domain::submission::{FragmentAcceptance, InboundFragment, RejoinOutcome};
use msh_01_message_store::{MessageRouting, NewMessage, StatusUpdate, StoreError};
use msh_03_split_and_join::domain::files;
use msh_03_split_and_join::{GroupState, MessageGroup, SourceMessage, SplitAndJoinError};
use shared_bus::GatewayEvent;
use shared_types::{DomainContext, GroupId, MessageId, MessageStatus, MshRole, NotificationStatus};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

const FRAGMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors that mean the group itself is broken, not the environment.
fn is_structural(error: &SplitAndJoinError) -> bool {
    matches!(
        error,
        SplitAndJoinError::IncompleteFragmentSet { .. }
            | SplitAndJoinError::MalformedSourceMessage { .. }
            | SplitAndJoinError::ChecksumMismatch { .. }
            | SplitAndJoinError::FragmentCreation { .. }
    )
}

impl RetryScheduler {
    pub async fn accept_inbound_fragment(
        &self,
        ctx: &DomainContext,
        fragment: InboundFragment,
    ) -> Result<FragmentAcceptance, SchedulerError> {
        let group_id = fragment.group_id.clone();
        let mut announced = MessageGroup::inbound(
            group_id.clone(),
            fragment.source_message_id.clone(),
            fragment.fragment_count,
            fragment.source_content_type.clone(),
        );
        announced.compressed = fragment.compressed;
        announced.join_interval_ms = fragment.join_interval_ms;
        self.inner.fragments.ensure_inbound_group(ctx, announced)?;

        if self.inner.store.find_message(ctx, &fragment.message_id)?.is_some() {
            return Err(StoreError::MessageExists {
                id: fragment.message_id,
            }
            .into());
        }

        let file = self.inner.fragments.write_fragment_file(
            ctx,
            &group_id,
            fragment.fragment_number,
            &fragment.payload,
        )?;
        let registration = match self.inner.fragments.register_inbound_fragment(
            ctx,
            &group_id,
            fragment.fragment_number,
            fragment.message_id.clone(),
            &file,
        ) {
            Ok(registration) => registration,
            Err(e) => {
                let _ = fs::remove_file(&file);
                return Err(e.into());
            }
        };

        let mut received = NewMessage::inbound(fragment.message_id.clone(), fragment.routing.clone());
        received.message_fragment = true;
        received.group_id = Some(group_id.clone());
        received.backend_name = fragment.backend_name.clone();
        received.content_type = FRAGMENT_CONTENT_TYPE.to_string();
        received.notification_status = NotificationStatus::NotRequired;
        if let Err(e) = self.inner.store.save(ctx, received, None) {
            if let Err(withdraw) = self.inner.fragments.withdraw_inbound_fragment(
                ctx,
                &group_id,
                fragment.fragment_number,
                &fragment.message_id,
            ) {
                warn!(
                    message_id = %fragment.message_id,
                    error = %withdraw,
                    "[msh-04] Could not withdraw fragment"
                );
            }
            return Err(e.into());
        }

        info!(
            domain = %ctx.domain(),
            message_id = %fragment.message_id,
            group_id = %group_id,
            fragment = fragment.fragment_number,
            of = fragment.fragment_count,
            "[msh-04] Fragment received"
        );

        let rejoin = if registration.complete {
            match self
                .rejoin(ctx, &group_id, &fragment.routing, &fragment.backend_name)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        domain = %ctx.domain(),
                        group_id = %group_id,
                        error = %e,
                        "[msh-04] Rejoin deferred"
                    );
                    RejoinOutcome::Deferred {
                        reason: e.to_string(),
                    }
                }
            }
        } else {
            RejoinOutcome::Pending
        };
        Ok(FragmentAcceptance {
            fragment_message_id: fragment.message_id,
            rejoin,
        })
    }

    /// Rejoin complete inbound groups that an earlier error or a restart
    /// left behind: groups still `Receiving` with every fragment in, and
    /// rejoined groups whose source message never reached the store.
    pub(crate) async fn resume_rejoins(
        &self,
        ctx: &DomainContext,
    ) -> Result<Vec<MessageId>, SchedulerError> {
        let mut pending = self.inner.fragments.complete_receiving_groups(ctx)?;
        for group in self.inner.fragments.list_groups(ctx)? {
            if group.msh_role == MshRole::Receiving
                && group.state == GroupState::Rejoined
                && self
                    .inner
                    .store
                    .find_message(ctx, &group.source_message_id)?
                    .is_none()
            {
                pending.push(group);
            }
        }

        let mut rejoined = Vec::new();
        for group in pending {
            let fragments = self.inner.fragments.get_fragments(ctx, &group.group_id)?;
            let origin = match fragments.first() {
                Some(fragment) => self.inner.store.find_message(ctx, &fragment.message_id)?,
                None => None,
            };
            let Some(origin) = origin else {
                warn!(group_id = %group.group_id, "[msh-04] No fragment message to rejoin from");
                continue;
            };
            match self
                .rejoin(ctx, &group.group_id, &origin.routing, &origin.backend_name)
                .await
            {
                Ok(RejoinOutcome::Rejoined(source_id)) => rejoined.push(source_id),
                Ok(_) => {}
                Err(e) => warn!(
                    domain = %ctx.domain(),
                    group_id = %group.group_id,
                    error = %e,
                    "[msh-04] Rejoin deferred again"
                ),
            }
        }
        Ok(rejoined)
    }

    async fn rejoin(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        routing: &MessageRouting,
        backend: &str,
    ) -> Result<RejoinOutcome, SchedulerError> {
        let joined = {
            let fragments = Arc::clone(&self.inner.fragments);
            let ctx = ctx.clone();
            let group_id = group_id.clone();
            tokio::task::spawn_blocking(move || -> Result<(MessageGroup, Vec<u8>), SplitAndJoinError> {
                let file = fragments.rejoin_message_fragments(&ctx, &group_id)?;
                let group = fragments.get_message_group(&ctx, &group_id)?;
                let raw = fs::read(&file).map_err(|e| SplitAndJoinError::Io {
                    message: format!("read rejoined file {}: {}", file.display(), e),
                })?;
                let bytes = if group.compressed {
                    files::decompress(&raw)?
                } else {
                    raw
                };
                SourceMessage::parse(&group.content_type, &bytes)?;
                Ok((group, bytes))
            })
            .await
            .map_err(|e| SchedulerError::Io {
                message: format!("rejoin task: {}", e),
            })?
        };

        let (group, bytes) = match joined {
            Ok(joined) => joined,
            Err(e) if is_structural(&e) => {
                if let Err(fail) = self.inner.fragments.fail_group(ctx, group_id) {
                    warn!(group_id = %group_id, error = %fail, "[msh-04] Could not fail group");
                }
                self.mark_reception_failed(ctx, group_id).await;
                warn!(
                    domain = %ctx.domain(),
                    group_id = %group_id,
                    error = %e,
                    "[msh-04] Rejoin failed"
                );
                self.publish(GatewayEvent::RejoinFailed {
                    domain: ctx.domain().clone(),
                    group_id: group_id.clone(),
                    error: e.to_string(),
                })
                .await;
                return Ok(RejoinOutcome::Failed(e));
            }
            Err(e) => return Err(e.into()),
        };

        let source_id = group.source_message_id.clone();
        let mut source = NewMessage::inbound(source_id.clone(), routing.clone());
        source.source_message = true;
        source.group_id = Some(group_id.clone());
        source.backend_name = backend.to_string();
        source.content_type = group.content_type.clone();
        match self.inner.store.save(ctx, source, Some(bytes)) {
            Ok(_) => {}
            Err(StoreError::MessageExists { .. }) => {
                return Ok(RejoinOutcome::Rejoined(source_id));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            domain = %ctx.domain(),
            message_id = %source_id,
            group_id = %group_id,
            fragments = group.fragment_count,
            "[msh-04] Source message rejoined"
        );
        self.publish(GatewayEvent::SourceMessageRejoined {
            domain: ctx.domain().clone(),
            group_id: group_id.clone(),
            message_id: source_id.clone(),
        })
        .await;
        self.notify_backend(
            ctx,
            &source_id,
            MessageStatus::Received,
            GatewayEvent::MessageReceived {
                domain: ctx.domain().clone(),
                message_id: source_id.clone(),
                backend: backend.to_string(),
            },
        )
        .await;
        Ok(RejoinOutcome::Rejoined(source_id))
    }

    /// Received fragments of a broken group end in `ReceivedFailure`.
    pub(crate) async fn mark_reception_failed(&self, ctx: &DomainContext, group_id: &GroupId) {
        let Ok(fragments) = self.inner.fragments.get_fragments(ctx, group_id) else {
            return;
        };
        for fragment in fragments {
            if self
                .inner
                .store
                .transition(
                    ctx,
                    &fragment.message_id,
                    &[MessageStatus::Received],
                    StatusUpdate::to(MessageStatus::ReceivedFailure),
                )
                .is_ok()
            {
                self.publish_status(
                    ctx,
                    &fragment.message_id,
                    MessageStatus::Received,
                    MessageStatus::ReceivedFailure,
                )
                .await;
            }
        }
    }
}
