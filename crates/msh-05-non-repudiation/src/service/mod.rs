//! # Non-Repudiation Service
//!
//! Implements [`NonRepudiationApi`](crate::ports::inbound::NonRepudiationApi)
//! on a [`KeyValueStore`]. The audit switch is read before anything else, so
//! a disabled recorder never touches the store.

mod api;
#[cfg(test)]
mod tests;

use crate::domain::config::NonRepudiationConfig;
use crate::domain::entities::RawEnvelopeLog;
use crate::domain::errors::NonRepudiationError;
use crate::domain::keys;
use crate::ports::outbound::{KeyValueStore, TimeSource};
use parking_lot::Mutex;
use shared_types::{DomainContext, MessageId};

pub struct NonRepudiationService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub(crate) kv_store: Mutex<KV>,
    pub(crate) time_source: TS,
    pub(crate) config: NonRepudiationConfig,
}

impl<KV, TS> NonRepudiationService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    pub fn new(kv_store: KV, time_source: TS, config: NonRepudiationConfig) -> Self {
        Self {
            kv_store: Mutex::new(kv_store),
            time_source,
            config,
        }
    }

    pub fn is_audit_active(&self) -> bool {
        self.config.audit_active
    }

    /// Append under the next free index of the message.
    pub(crate) fn append(
        &self,
        ctx: &DomainContext,
        log: &RawEnvelopeLog,
    ) -> Result<(), NonRepudiationError> {
        if log.raw.len() > self.config.max_envelope_bytes {
            return Err(NonRepudiationError::EnvelopeTooLarge {
                message_id: log.message_id.clone(),
                size: log.raw.len(),
                max: self.config.max_envelope_bytes,
            });
        }
        let bytes = bincode::serialize(log).map_err(|e| NonRepudiationError::Serialization {
            message: e.to_string(),
        })?;

        let mut kv = self.kv_store.lock();
        let index = kv
            .prefix_scan(&keys::envelope_prefix(ctx, &log.message_id))?
            .len();
        kv.put(&keys::envelope_key(ctx, &log.message_id, index), &bytes)?;
        Ok(())
    }

    pub(crate) fn scan(
        kv: &KV,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Vec<(Vec<u8>, RawEnvelopeLog)>, NonRepudiationError> {
        kv.prefix_scan(&keys::envelope_prefix(ctx, message_id))?
            .into_iter()
            .map(|(key, bytes)| {
                bincode::deserialize(&bytes)
                    .map(|log| (key, log))
                    .map_err(|e| NonRepudiationError::Serialization {
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
