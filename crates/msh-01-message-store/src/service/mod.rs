//! # Message Store Service
//!
//! Implements [`MessageStoreApi`] on top of a [`KeyValueStore`].
//!
//! All operations go through one mutex around the key-value store. A
//! compare-and-set is therefore read-check-write under the lock, and every
//! write that touches more than one key is a single `atomic_batch_write`.

mod api;
#[cfg(test)]
mod tests;

use crate::adapters::codec::{decode, encode};
use crate::domain::config::StoreConfig;
use crate::domain::entities::Message;
use crate::domain::errors::StoreError;
use crate::domain::keys;
use crate::ports::outbound::{KeyValueStore, TimeSource};
use parking_lot::Mutex;
use shared_types::{DomainContext, MessageId};

/// The Message Store Service.
pub struct MessageStoreService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub(crate) kv_store: Mutex<KV>,
    pub(crate) time_source: TS,
    pub(crate) config: StoreConfig,
}

impl<KV, TS> MessageStoreService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub fn new(kv_store: KV, time_source: TS, config: StoreConfig) -> Self {
        Self {
            kv_store: Mutex::new(kv_store),
            time_source,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn load(
        kv: &KV,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError> {
        kv.get(&keys::message_key(ctx, id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub(crate) fn load_existing(
        kv: &KV,
        ctx: &DomainContext,
        id: &MessageId,
    ) -> Result<Message, StoreError> {
        Self::load(kv, ctx, id)?.ok_or_else(|| StoreError::MessageNotFound { id: id.clone() })
    }

    pub(crate) fn store(kv: &mut KV, ctx: &DomainContext, message: &Message) -> Result<(), StoreError> {
        kv.put(&keys::message_key(ctx, &message.id), &encode(message)?)?;
        Ok(())
    }

    /// Every message of the domain, in id order.
    pub(crate) fn scan_messages(kv: &KV, ctx: &DomainContext) -> Result<Vec<Message>, StoreError> {
        kv.prefix_scan(&ctx.key_prefix(keys::MESSAGE_SECTION))?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }
}
