//! `SplitAndJoinApi` implementation.

use super::*;
use crate::domain::entities::{FragmentRegistration, GroupState, SplitOutcome};
use crate::domain::files;
use crate::domain::mime::SourceMessage;
use crate::ports::inbound::SplitAndJoinApi;
use crate::ports::outbound::BatchOperation;
use msh_02_leg_configuration::LegConfiguration;
use shared_types::{MshRole, Timestamp};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

fn invalid(reason: impl Into<String>) -> SplitAndJoinError {
    SplitAndJoinError::InvalidGroup {
        reason: reason.into(),
    }
}

fn fragment_batch(
    ctx: &DomainContext,
    fragment: &MessageFragmentEntity,
) -> Result<[BatchOperation; 2], SplitAndJoinError> {
    Ok([
        BatchOperation::put(
            keys::fragment_key(ctx, &fragment.group_id, fragment.fragment_number),
            encode(fragment)?,
        ),
        BatchOperation::put(
            keys::fragment_index_key(ctx, &fragment.message_id),
            encode(&(fragment.group_id.clone(), fragment.fragment_number))?,
        ),
    ])
}

impl<KV, TS> FragmentManagerService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Count and number check. Fragments come back in key order.
    fn check_complete(
        group: &MessageGroup,
        fragments: &[MessageFragmentEntity],
    ) -> Result<(), SplitAndJoinError> {
        let contiguous = fragments
            .iter()
            .enumerate()
            .all(|(n, f)| f.fragment_number == n as u32);
        if fragments.len() as u32 != group.fragment_count || !contiguous {
            return Err(SplitAndJoinError::IncompleteFragmentSet {
                group_id: group.group_id.clone(),
                expected: group.fragment_count,
                found: fragments.len() as u32,
            });
        }
        Ok(())
    }

    /// The recorded rejoin output, when it is still intact.
    fn existing_rejoin(group: &MessageGroup) -> Option<PathBuf> {
        let (file, checksum) = (group.rejoined_file.as_ref()?, group.rejoined_checksum?);
        match files::digest_file(file) {
            Ok((_, actual)) if actual == checksum => Some(file.clone()),
            _ => None,
        }
    }

    /// Stream every fragment into `target`, verifying each digest.
    fn concatenate(
        group: &MessageGroup,
        fragments: &[MessageFragmentEntity],
        target: &Path,
    ) -> Result<(u64, u32), SplitAndJoinError> {
        let mut out = fs::File::create(target).map_err(|e| SplitAndJoinError::io("create", e))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut total = 0u64;
        for fragment in fragments {
            let bytes = fs::read(&fragment.file).map_err(|e| {
                SplitAndJoinError::io(&format!("read {}", fragment.file.display()), e)
            })?;
            if bytes.len() as u64 != fragment.length || crc32fast::hash(&bytes) != fragment.checksum {
                return Err(SplitAndJoinError::ChecksumMismatch {
                    group_id: group.group_id.clone(),
                    fragment_number: fragment.fragment_number,
                });
            }
            out.write_all(&bytes)
                .map_err(|e| SplitAndJoinError::io("write", e))?;
            hasher.update(&bytes);
            total += bytes.len() as u64;
        }
        out.sync_all().map_err(|e| SplitAndJoinError::io("sync", e))?;
        Ok((total, hasher.finalize()))
    }

    /// Apply `update` to the group of a fragment message under its lock.
    fn update_group_of(
        &self,
        ctx: &DomainContext,
        fragment_message_id: &MessageId,
        update: impl FnOnce(&mut MessageGroup),
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let fragment = {
            let kv = self.kv_store.lock();
            Self::load_fragment_by_message(&kv, ctx, fragment_message_id)?
        }
        .ok_or_else(|| SplitAndJoinError::FragmentNotFound {
            message_id: fragment_message_id.clone(),
        })?;

        let lock = self.group_lock(ctx, &fragment.group_id);
        let _guard = lock.lock();
        let mut kv = self.kv_store.lock();
        let mut group = Self::load_existing_group(&kv, ctx, &fragment.group_id)?;
        update(&mut group);
        Self::store_group(&mut kv, ctx, &group)?;
        Ok(group)
    }
}

impl<KV, TS> SplitAndJoinApi for FragmentManagerService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    fn generate_source_file_name(&self, temp_dir: &Path) -> PathBuf {
        loop {
            let candidate = temp_dir.join(format!("{}.source", uuid::Uuid::new_v4()));
            if !candidate.exists() {
                return candidate;
            }
        }
    }

    fn split_source_message(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        source_file: &Path,
        leg: &LegConfiguration,
        fragments_dir: &Path,
    ) -> Result<SplitOutcome, SplitAndJoinError> {
        let splitting = leg
            .splitting
            .as_ref()
            .ok_or_else(|| SplitAndJoinError::FragmentCreation {
                reason: format!("leg {} does not allow split-and-join", leg.name),
            })?;

        let source = fs::read(source_file).map_err(|e| SplitAndJoinError::FragmentCreation {
            reason: format!("cannot read source {}: {}", source_file.display(), e),
        })?;
        let message_size = source.len() as u64;

        #[cfg(feature = "compression")]
        let (bytes, compressed) = if splitting.compression {
            (files::compress(&source, self.config.compression_level)?, true)
        } else {
            (source, false)
        };
        #[cfg(not(feature = "compression"))]
        let (bytes, compressed) = (source, false);

        let dir = Self::domain_dir(fragments_dir, ctx);
        let fragment_files = files::cut(&bytes, splitting.fragment_size, &dir, group_id)?;

        info!(
            domain = %ctx.domain(),
            group_id = %group_id,
            fragments = fragment_files.len(),
            message_size,
            compressed,
            "[msh-03] Source message split"
        );

        Ok(SplitOutcome {
            files: fragment_files,
            message_size,
            compressed,
        })
    }

    fn create_message_group(
        &self,
        ctx: &DomainContext,
        mut group: MessageGroup,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        if group.fragment_count == 0 {
            return Err(invalid(format!(
                "group {} declares zero fragments",
                group.group_id
            )));
        }

        let mut kv = self.kv_store.lock();
        if Self::load_group(&kv, ctx, &group.group_id)?.is_some() {
            return Err(SplitAndJoinError::GroupExists {
                group_id: group.group_id,
            });
        }
        group.created = self.time_source.now();
        Self::store_group(&mut kv, ctx, &group)?;

        debug!(
            domain = %ctx.domain(),
            group_id = %group.group_id,
            fragment_count = group.fragment_count,
            "[msh-03] Message group created"
        );
        Ok(group)
    }

    fn ensure_inbound_group(
        &self,
        ctx: &DomainContext,
        group: MessageGroup,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let lock = self.group_lock(ctx, &group.group_id);
        let _guard = lock.lock();

        let existing = {
            let kv = self.kv_store.lock();
            Self::load_group(&kv, ctx, &group.group_id)?
        };
        match existing {
            Some(existing) if existing.agrees_with(&group) => Ok(existing),
            Some(existing) => Err(invalid(format!(
                "fragment disagrees with group {} ({} fragments of {})",
                existing.group_id, existing.fragment_count, existing.source_message_id
            ))),
            None => self.create_message_group(
                ctx,
                MessageGroup {
                    msh_role: MshRole::Receiving,
                    state: GroupState::Receiving,
                    ..group
                },
            ),
        }
    }

    fn get_message_group(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let kv = self.kv_store.lock();
        Self::load_existing_group(&kv, ctx, group_id)
    }

    fn list_groups(&self, ctx: &DomainContext) -> Result<Vec<MessageGroup>, SplitAndJoinError> {
        let kv = self.kv_store.lock();
        kv.prefix_scan(&ctx.key_prefix(keys::GROUP_SECTION))?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    fn create_message_fragments(
        &self,
        ctx: &DomainContext,
        source_message_id: &MessageId,
        group: &MessageGroup,
        fragment_files: &[PathBuf],
    ) -> Result<Vec<MessageFragmentEntity>, SplitAndJoinError> {
        if &group.source_message_id != source_message_id {
            return Err(invalid(format!(
                "group {} belongs to {}, not {}",
                group.group_id, group.source_message_id, source_message_id
            )));
        }
        if fragment_files.is_empty() || fragment_files.len() as u32 != group.fragment_count {
            return Err(SplitAndJoinError::FragmentCreation {
                reason: format!(
                    "group {} declares {} fragments, got {} files",
                    group.group_id,
                    group.fragment_count,
                    fragment_files.len()
                ),
            });
        }

        // Every file is read before any record is written.
        let mut fragments = Vec::with_capacity(fragment_files.len());
        for (n, file) in fragment_files.iter().enumerate() {
            let (length, checksum) =
                files::digest_file(file).map_err(|e| SplitAndJoinError::FragmentCreation {
                    reason: format!("fragment {} ({}): {}", n, file.display(), e),
                })?;
            fragments.push(MessageFragmentEntity {
                group_id: group.group_id.clone(),
                fragment_number: n as u32,
                message_id: MessageId::generate(&self.config.message_id_suffix),
                file: file.clone(),
                length,
                checksum,
            });
        }

        let lock = self.group_lock(ctx, &group.group_id);
        let _guard = lock.lock();
        let mut kv = self.kv_store.lock();
        Self::load_existing_group(&kv, ctx, &group.group_id)?;
        if let Some(existing) = Self::load_fragments(&kv, ctx, &group.group_id)?.first() {
            return Err(SplitAndJoinError::DuplicateFragment {
                group_id: group.group_id.clone(),
                fragment_number: existing.fragment_number,
            });
        }

        let mut batch = Vec::with_capacity(fragments.len() * 2);
        for fragment in &fragments {
            batch.extend(fragment_batch(ctx, fragment)?);
        }
        kv.atomic_batch_write(batch)?;

        info!(
            domain = %ctx.domain(),
            group_id = %group.group_id,
            source_message_id = %source_message_id,
            fragments = fragments.len(),
            "[msh-03] Message fragments created"
        );
        Ok(fragments)
    }

    fn write_fragment_file(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        bytes: &[u8],
    ) -> Result<PathBuf, SplitAndJoinError> {
        let dir = Self::domain_dir(&self.config.fragments_dir, ctx);
        fs::create_dir_all(&dir).map_err(|e| SplitAndJoinError::io("create fragments dir", e))?;
        let path = dir.join(files::received_fragment_file_name(group_id, fragment_number));
        files::write_atomically(&path, bytes)?;
        Ok(path)
    }

    fn register_inbound_fragment(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        message_id: MessageId,
        file: &Path,
    ) -> Result<FragmentRegistration, SplitAndJoinError> {
        let (length, checksum) =
            files::digest_file(file).map_err(|e| SplitAndJoinError::FragmentCreation {
                reason: format!("fragment {} ({}): {}", fragment_number, file.display(), e),
            })?;

        let lock = self.group_lock(ctx, group_id);
        let _guard = lock.lock();
        let mut kv = self.kv_store.lock();

        let group = Self::load_existing_group(&kv, ctx, group_id)?;
        if group.state != GroupState::Receiving {
            return Err(invalid(format!(
                "group {} is {:?}, not receiving",
                group_id, group.state
            )));
        }
        if fragment_number >= group.fragment_count {
            return Err(invalid(format!(
                "fragment {} out of range for group {} of {}",
                fragment_number, group_id, group.fragment_count
            )));
        }
        if kv.exists(&keys::fragment_key(ctx, group_id, fragment_number))? {
            return Err(SplitAndJoinError::DuplicateFragment {
                group_id: group_id.clone(),
                fragment_number,
            });
        }

        let fragment = MessageFragmentEntity {
            group_id: group_id.clone(),
            fragment_number,
            message_id,
            file: file.to_path_buf(),
            length,
            checksum,
        };
        kv.atomic_batch_write(fragment_batch(ctx, &fragment)?.into())?;

        let registered = Self::load_fragments(&kv, ctx, group_id)?.len() as u32;
        let complete = registered == group.fragment_count;
        debug!(
            domain = %ctx.domain(),
            group_id = %group_id,
            fragment_number,
            registered,
            expected = group.fragment_count,
            "[msh-03] Inbound fragment registered"
        );
        Ok(FragmentRegistration { fragment, complete })
    }

    fn get_fragments(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<Vec<MessageFragmentEntity>, SplitAndJoinError> {
        let kv = self.kv_store.lock();
        Self::load_fragments(&kv, ctx, group_id)
    }

    fn withdraw_inbound_fragment(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        message_id: &MessageId,
    ) -> Result<(), SplitAndJoinError> {
        let lock = self.group_lock(ctx, group_id);
        let _guard = lock.lock();
        let mut kv = self.kv_store.lock();

        let key = keys::fragment_key(ctx, group_id, fragment_number);
        let Some(bytes) = kv.get(&key)? else {
            return Ok(());
        };
        let fragment: MessageFragmentEntity = decode(&bytes)?;
        if &fragment.message_id != message_id {
            return Ok(());
        }
        kv.atomic_batch_write(vec![
            BatchOperation::delete(key),
            BatchOperation::delete(keys::fragment_index_key(ctx, message_id)),
        ])?;
        drop(kv);

        if let Err(e) = fs::remove_file(&fragment.file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = %fragment.file.display(), error = %e, "[msh-03] Could not remove file");
            }
        }
        debug!(
            domain = %ctx.domain(),
            group_id = %group_id,
            fragment_number,
            "[msh-03] Inbound fragment withdrawn"
        );
        Ok(())
    }

    fn complete_receiving_groups(
        &self,
        ctx: &DomainContext,
    ) -> Result<Vec<MessageGroup>, SplitAndJoinError> {
        let kv = self.kv_store.lock();
        let mut complete = Vec::new();
        for (_, bytes) in kv.prefix_scan(&ctx.key_prefix(keys::GROUP_SECTION))? {
            let group: MessageGroup = decode(&bytes)?;
            if group.state != GroupState::Receiving {
                continue;
            }
            let registered = Self::load_fragments(&kv, ctx, &group.group_id)?.len() as u32;
            if registered == group.fragment_count {
                complete.push(group);
            }
        }
        Ok(complete)
    }

    fn fragment_for_message(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Option<MessageFragmentEntity>, SplitAndJoinError> {
        let kv = self.kv_store.lock();
        Self::load_fragment_by_message(&kv, ctx, message_id)
    }

    fn read_fragment_payload(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Vec<u8>, SplitAndJoinError> {
        let fragment = self.fragment_for_message(ctx, message_id)?.ok_or_else(|| {
            SplitAndJoinError::FragmentNotFound {
                message_id: message_id.clone(),
            }
        })?;
        let bytes = fs::read(&fragment.file)
            .map_err(|e| SplitAndJoinError::io(&format!("read {}", fragment.file.display()), e))?;
        if crc32fast::hash(&bytes) != fragment.checksum {
            return Err(SplitAndJoinError::ChecksumMismatch {
                group_id: fragment.group_id,
                fragment_number: fragment.fragment_number,
            });
        }
        Ok(bytes)
    }

    fn rejoin_message_fragments(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<PathBuf, SplitAndJoinError> {
        let lock = self.group_lock(ctx, group_id);
        let _guard = lock.lock();

        let (group, fragments) = {
            let kv = self.kv_store.lock();
            let group = Self::load_existing_group(&kv, ctx, group_id)?;
            let fragments = Self::load_fragments(&kv, ctx, group_id)?;
            (group, fragments)
        };

        if group.state == GroupState::Rejoined {
            if let Some(file) = Self::existing_rejoin(&group) {
                debug!(group_id = %group_id, "[msh-03] Group already rejoined");
                return Ok(file);
            }
            warn!(
                group_id = %group_id,
                "[msh-03] Rejoined file missing or altered, rejoining again"
            );
        }
        Self::check_complete(&group, &fragments)?;

        let dir = Self::domain_dir(&self.config.work_dir, ctx);
        fs::create_dir_all(&dir).map_err(|e| SplitAndJoinError::io("create work dir", e))?;
        let target = self.generate_source_file_name(&dir);
        let mut part = target.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        let (length, checksum) = match Self::concatenate(&group, &fragments, &part) {
            Ok(digest) => digest,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(e);
            }
        };
        fs::rename(&part, &target).map_err(|e| SplitAndJoinError::io("rename", e))?;

        let mut kv = self.kv_store.lock();
        let mut group = Self::load_existing_group(&kv, ctx, group_id)?;
        group.state = GroupState::Rejoined;
        group.rejoined_file = Some(target.clone());
        group.rejoined_checksum = Some(checksum);
        if group.message_size == 0 && !group.compressed {
            group.message_size = length;
        }
        Self::store_group(&mut kv, ctx, &group)?;

        info!(
            domain = %ctx.domain(),
            group_id = %group_id,
            fragments = fragments.len(),
            bytes = length,
            "[msh-03] Message fragments rejoined"
        );
        Ok(target)
    }

    fn rejoin_source_message(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        file: &Path,
    ) -> Result<SourceMessage, SplitAndJoinError> {
        let group = self.get_message_group(ctx, group_id)?;
        let raw = fs::read(file)
            .map_err(|e| SplitAndJoinError::io(&format!("read {}", file.display()), e))?;
        let body = if group.compressed {
            files::decompress(&raw)?
        } else {
            raw
        };
        SourceMessage::parse(&group.content_type, &body)
    }

    fn on_fragment_sent(
        &self,
        ctx: &DomainContext,
        fragment_message_id: &MessageId,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let group = self.update_group_of(ctx, fragment_message_id, |group| {
            if group.state != GroupState::Sending {
                return;
            }
            group.sent_fragments = (group.sent_fragments + 1).min(group.fragment_count);
            if group.sent_fragments == group.fragment_count {
                group.state = GroupState::Sent;
            }
        })?;
        if group.state == GroupState::Sent {
            info!(
                domain = %ctx.domain(),
                group_id = %group.group_id,
                "[msh-03] All fragments sent"
            );
        }
        Ok(group)
    }

    fn on_fragment_failed(
        &self,
        ctx: &DomainContext,
        fragment_message_id: &MessageId,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let group = self.update_group_of(ctx, fragment_message_id, |group| {
            if group.state.is_open() {
                group.state = GroupState::Failed;
            }
        })?;
        warn!(
            domain = %ctx.domain(),
            group_id = %group.group_id,
            fragment = %fragment_message_id,
            "[msh-03] Fragment failed, group marked failed"
        );
        Ok(group)
    }

    fn fail_group(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        let lock = self.group_lock(ctx, group_id);
        let _guard = lock.lock();
        let mut kv = self.kv_store.lock();
        let mut group = Self::load_existing_group(&kv, ctx, group_id)?;
        if group.state.is_open() {
            group.state = GroupState::Failed;
            Self::store_group(&mut kv, ctx, &group)?;
        }
        Ok(group)
    }

    fn expire_stale_groups(
        &self,
        ctx: &DomainContext,
        now: Timestamp,
    ) -> Result<Vec<GroupId>, SplitAndJoinError> {
        let stale: Vec<MessageGroup> = self
            .list_groups(ctx)?
            .into_iter()
            .filter(|g| {
                g.state == GroupState::Receiving
                    && g.join_interval_ms > 0
                    && g.created.saturating_add(g.join_interval_ms) <= now
            })
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for group in stale {
            let lock = self.group_lock(ctx, &group.group_id);
            let _guard = lock.lock();
            let mut kv = self.kv_store.lock();
            // Re-read: the group may have completed since the scan.
            let Some(mut current) = Self::load_group(&kv, ctx, &group.group_id)? else {
                continue;
            };
            if current.state != GroupState::Receiving {
                continue;
            }
            // Every fragment arrived; only the rejoin is outstanding.
            let registered = Self::load_fragments(&kv, ctx, &current.group_id)?.len() as u32;
            if registered == current.fragment_count {
                debug!(group_id = %current.group_id, "[msh-03] Complete group not expired");
                continue;
            }
            current.state = GroupState::Expired;
            Self::store_group(&mut kv, ctx, &current)?;
            info!(
                domain = %ctx.domain(),
                group_id = %current.group_id,
                "[msh-03] Incomplete group expired"
            );
            expired.push(current.group_id);
        }
        Ok(expired)
    }

    fn purge_group(&self, ctx: &DomainContext, group_id: &GroupId) -> Result<(), SplitAndJoinError> {
        let lock = self.group_lock(ctx, group_id);
        {
            let _guard = lock.lock();
            let mut kv = self.kv_store.lock();
            let Some(group) = Self::load_group(&kv, ctx, group_id)? else {
                return Ok(());
            };
            let fragments = Self::load_fragments(&kv, ctx, group_id)?;

            let mut batch = vec![BatchOperation::delete(keys::group_key(ctx, group_id))];
            for fragment in &fragments {
                batch.push(BatchOperation::delete(keys::fragment_key(
                    ctx,
                    group_id,
                    fragment.fragment_number,
                )));
                batch.push(BatchOperation::delete(keys::fragment_index_key(
                    ctx,
                    &fragment.message_id,
                )));
            }
            kv.atomic_batch_write(batch)?;

            let paths = fragments
                .iter()
                .map(|f| &f.file)
                .chain(group.rejoined_file.as_ref())
                .chain(group.source_file.as_ref());
            for file in paths {
                if let Err(e) = fs::remove_file(file) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(file = %file.display(), error = %e, "[msh-03] Could not remove file");
                    }
                }
            }
            info!(
                domain = %ctx.domain(),
                group_id = %group_id,
                fragments = fragments.len(),
                "[msh-03] Message group purged"
            );
        }
        self.forget_group_lock(ctx, group_id);
        Ok(())
    }
}
