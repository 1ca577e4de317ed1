//! Accepting outbound submissions, with split-and-join when the leg asks
//! for it.

use super::RetryScheduler;
use crate::domain::errors::SchedulerError;
use crate::domain::submission::Submission;
use msh_01_message_store::NewMessage;
use msh_02_leg_configuration::{LegConfiguration, RoutingKey};
use msh_03_split_and_join::{MessageGroup, SourceMessage};
use shared_types::{DomainContext, GroupId, MessageId, NotificationStatus};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const FRAGMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// A source message cut into a stored group of queued fragments.
pub(crate) struct SplitGroup {
    pub group_id: GroupId,
    pub fragment_ids: Vec<MessageId>,
    pub compressed: bool,
}

impl RetryScheduler {
    pub async fn submit(
        &self,
        ctx: &DomainContext,
        submission: Submission,
    ) -> Result<MessageId, SchedulerError> {
        if self.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown);
        }

        let key = RoutingKey {
            from_party: submission.routing.from_party.clone(),
            to_party: submission.routing.to_party.clone(),
            service: submission.routing.service.clone(),
            action: submission.routing.action.clone(),
        };
        let leg = self.inner.legs.resolve_routing(ctx, &key)?;

        let id = submission
            .message_id
            .clone()
            .unwrap_or_else(|| MessageId::generate(&self.inner.config.message_id_suffix));
        let now = self.now();

        let mut new = NewMessage::outbound(id.clone(), submission.routing.clone());
        new.send_attempts_max = leg.max_attempts();
        new.leg_name = Some(leg.name.clone());
        if let Some(mpc) = submission.mpc.clone().or_else(|| leg.default_mpc.clone()) {
            new.mpc = mpc;
        }
        new.content_type = submission.content_type.clone();
        new.backend_name = submission.backend_name.clone();
        new.original_sender = submission.original_sender.clone();
        new.final_recipient = submission.final_recipient.clone();
        if !submission.notify_backend {
            new.notification_status = NotificationStatus::NotRequired;
        }
        new.next_attempt = Some(now);

        if self
            .inner
            .legs
            .should_split(&leg, submission.payload.len() as u64)
        {
            return self.submit_split(ctx, new, submission.payload, leg).await;
        }

        self.inner.store.save(ctx, new, Some(submission.payload))?;
        info!(
            domain = %ctx.domain(),
            message_id = %id,
            leg = %leg.name,
            "[msh-04] Message submitted"
        );
        self.arm(ctx, &id, now, 0);
        Ok(id)
    }

    /// Cut the source message into fragments, store it and queue every
    /// fragment. The source itself is never dispatched.
    async fn submit_split(
        &self,
        ctx: &DomainContext,
        source: NewMessage,
        payload: Vec<u8>,
        leg: Arc<LegConfiguration>,
    ) -> Result<MessageId, SchedulerError> {
        SourceMessage::parse(&source.content_type, &payload)?;

        let source_id = source.id.clone();
        let split = self.split_into_group(ctx, &source, &payload, &leg).await?;

        let mut stored = source;
        stored.source_message = true;
        stored.group_id = Some(split.group_id.clone());
        stored.next_attempt = None;
        if let Err(e) = self.inner.store.save(ctx, stored, Some(payload)) {
            self.discard_fragments(ctx, &split.group_id);
            return Err(e.into());
        }

        info!(
            domain = %ctx.domain(),
            message_id = %source_id,
            group_id = %split.group_id,
            fragments = split.fragment_ids.len(),
            compressed = split.compressed,
            "[msh-04] Message split"
        );
        self.arm_fragments(ctx, &split.fragment_ids);
        Ok(source_id)
    }

    /// Write the source file, split it into a new group and store one queued
    /// message per fragment, each a copy of `template`. Nothing of the group
    /// is left behind on error.
    pub(crate) async fn split_into_group(
        &self,
        ctx: &DomainContext,
        template: &NewMessage,
        payload: &[u8],
        leg: &Arc<LegConfiguration>,
    ) -> Result<SplitGroup, SchedulerError> {
        let join_interval_ms = leg.splitting.as_ref().map_or(0, |s| s.join_interval_ms);
        let sources_dir = self.inner.config.sources_dir().join(ctx.domain().as_str());
        fs::create_dir_all(&sources_dir)
            .map_err(|e| SchedulerError::io("create sources dir", e))?;
        let source_file = self.inner.fragments.generate_source_file_name(&sources_dir);
        fs::write(&source_file, payload).map_err(|e| SchedulerError::io("write source", e))?;

        let group_id = GroupId::generate();
        let outcome = {
            let fragments = Arc::clone(&self.inner.fragments);
            let ctx = ctx.clone();
            let group_id = group_id.clone();
            let source_file = source_file.clone();
            let fragments_dir = self.inner.config.fragments_dir();
            let leg = Arc::clone(leg);
            tokio::task::spawn_blocking(move || {
                fragments.split_source_message(&ctx, &group_id, &source_file, &leg, &fragments_dir)
            })
            .await
            .map_err(|e| SchedulerError::Io {
                message: format!("split task: {}", e),
            })?
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = fs::remove_file(&source_file);
                return Err(e.into());
            }
        };

        let mut group = MessageGroup::outbound(
            group_id.clone(),
            template.id.clone(),
            outcome.files.len() as u32,
            template.content_type.clone(),
        );
        group.compressed = outcome.compressed;
        group.message_size = outcome.message_size;
        group.source_file = Some(source_file.clone());
        group.join_interval_ms = join_interval_ms;

        match self.store_fragment_messages(ctx, template, group, &outcome.files) {
            Ok(fragment_ids) => Ok(SplitGroup {
                group_id,
                fragment_ids,
                compressed: outcome.compressed,
            }),
            Err(e) => {
                self.discard_fragments(ctx, &group_id);
                for file in outcome.files.iter().chain(std::iter::once(&source_file)) {
                    let _ = fs::remove_file(file);
                }
                Err(e)
            }
        }
    }

    pub(crate) fn arm_fragments(&self, ctx: &DomainContext, fragment_ids: &[MessageId]) {
        let now = self.now();
        for id in fragment_ids {
            self.arm(ctx, id, now, 0);
        }
    }

    fn store_fragment_messages(
        &self,
        ctx: &DomainContext,
        template: &NewMessage,
        group: MessageGroup,
        files: &[PathBuf],
    ) -> Result<Vec<MessageId>, SchedulerError> {
        let group = self.inner.fragments.create_message_group(ctx, group)?;
        let entities =
            self.inner
                .fragments
                .create_message_fragments(ctx, &template.id, &group, files)?;

        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let mut fragment = template.clone();
            fragment.id = entity.message_id.clone();
            fragment.source_message = false;
            fragment.message_fragment = true;
            fragment.group_id = Some(group.group_id.clone());
            fragment.content_type = FRAGMENT_CONTENT_TYPE.to_string();
            self.inner.store.save(ctx, fragment, None)?;
            ids.push(entity.message_id);
        }
        Ok(ids)
    }

    /// Best-effort removal of a group's fragment messages and the group.
    /// The source message is left alone.
    pub(crate) fn discard_fragments(&self, ctx: &DomainContext, group_id: &GroupId) {
        if let Ok(fragments) = self.inner.fragments.get_fragments(ctx, group_id) {
            for fragment in fragments {
                let _ = self.inner.store.set_message_as_deleted(ctx, &fragment.message_id);
                self.inner.legs.invalidate(ctx, &fragment.message_id);
            }
        }
        if let Err(e) = self.inner.fragments.purge_group(ctx, group_id) {
            warn!(group_id = %group_id, error = %e, "[msh-04] Could not purge group");
        }
    }
}
