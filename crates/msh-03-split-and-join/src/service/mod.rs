//! # Fragment Manager Service
//!
//! Implements [`SplitAndJoinApi`](crate::ports::inbound::SplitAndJoinApi).
//!
//! Record reads and writes go through one mutex around the key-value store.
//! Work on a single group (registration, rejoin, accounting) additionally
//! holds that group's lock, so two rejoins of the same group never
//! interleave their file writes.

mod api;

use crate::domain::config::SplitAndJoinConfig;
use crate::domain::entities::{MessageFragmentEntity, MessageGroup};
use crate::domain::errors::SplitAndJoinError;
use crate::domain::keys;
use crate::ports::outbound::{KeyValueStore, TimeSource};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{DomainContext, DomainId, GroupId, MessageId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, SplitAndJoinError> {
    bincode::serialize(record).map_err(|e| SplitAndJoinError::Serialization {
        message: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SplitAndJoinError> {
    bincode::deserialize(bytes).map_err(|e| SplitAndJoinError::Serialization {
        message: e.to_string(),
    })
}

/// The Fragment Manager Service.
pub struct FragmentManagerService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub(crate) kv_store: Mutex<KV>,
    pub(crate) time_source: TS,
    pub(crate) config: SplitAndJoinConfig,
    group_locks: Mutex<HashMap<(DomainId, GroupId), Arc<Mutex<()>>>>,
}

impl<KV, TS> FragmentManagerService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub fn new(kv_store: KV, time_source: TS, config: SplitAndJoinConfig) -> Self {
        Self {
            kv_store: Mutex::new(kv_store),
            time_source,
            config,
            group_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SplitAndJoinConfig {
        &self.config
    }

    /// Lock handle for one group; hold `.lock()` on the result.
    pub(crate) fn group_lock(&self, ctx: &DomainContext, group_id: &GroupId) -> Arc<Mutex<()>> {
        self.group_locks
            .lock()
            .entry((ctx.domain().clone(), group_id.clone()))
            .or_default()
            .clone()
    }

    pub(crate) fn forget_group_lock(&self, ctx: &DomainContext, group_id: &GroupId) {
        self.group_locks
            .lock()
            .remove(&(ctx.domain().clone(), group_id.clone()));
    }

    /// Per-domain subdirectory, so tenants never share fragment files.
    pub(crate) fn domain_dir(base: &std::path::Path, ctx: &DomainContext) -> PathBuf {
        base.join(ctx.domain().as_str())
    }

    pub(crate) fn load_group(
        kv: &KV,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<Option<MessageGroup>, SplitAndJoinError> {
        kv.get(&keys::group_key(ctx, group_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub(crate) fn load_existing_group(
        kv: &KV,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<MessageGroup, SplitAndJoinError> {
        Self::load_group(kv, ctx, group_id)?.ok_or_else(|| SplitAndJoinError::GroupNotFound {
            group_id: group_id.clone(),
        })
    }

    pub(crate) fn store_group(
        kv: &mut KV,
        ctx: &DomainContext,
        group: &MessageGroup,
    ) -> Result<(), SplitAndJoinError> {
        kv.put(&keys::group_key(ctx, &group.group_id), &encode(group)?)?;
        Ok(())
    }

    pub(crate) fn load_fragments(
        kv: &KV,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<Vec<MessageFragmentEntity>, SplitAndJoinError> {
        kv.prefix_scan(&keys::fragment_prefix(ctx, group_id))?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    pub(crate) fn load_fragment_by_message(
        kv: &KV,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Option<MessageFragmentEntity>, SplitAndJoinError> {
        let Some(bytes) = kv.get(&keys::fragment_index_key(ctx, message_id))? else {
            return Ok(None);
        };
        let (group_id, fragment_number): (GroupId, u32) = decode(&bytes)?;
        kv.get(&keys::fragment_key(ctx, &group_id, fragment_number))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}
