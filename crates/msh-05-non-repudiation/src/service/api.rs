//! `NonRepudiationApi` implementation.

use super::NonRepudiationService;
use crate::domain::entities::{EnvelopeKind, RawEnvelopeLog, SignalMessageRef, UserMessageRef};
use crate::domain::errors::NonRepudiationError;
use crate::domain::keys;
use crate::ports::inbound::NonRepudiationApi;
use crate::ports::outbound::{KeyValueStore, TimeSource};
use shared_types::{BatchOperation, DomainContext, MessageId};
use tracing::{debug, warn};

impl<KV, TS> NonRepudiationApi for NonRepudiationService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    fn save_request(&self, ctx: &DomainContext, wire: &[u8], user_message: &UserMessageRef) {
        if !self.config.audit_active {
            return;
        }

        let log = RawEnvelopeLog::new(
            user_message.message_id.clone(),
            EnvelopeKind::Request,
            wire.to_vec(),
            self.time_source.now(),
        );
        match self.append(ctx, &log) {
            Ok(()) => debug!(
                domain = %ctx.domain(),
                message_id = %log.message_id,
                bytes = log.length,
                "[msh-05] Request envelope recorded"
            ),
            Err(e) => warn!(
                domain = %ctx.domain(),
                message_id = %log.message_id,
                error = %e,
                "[msh-05] Unable to record request envelope"
            ),
        }
    }

    fn save_response(&self, ctx: &DomainContext, wire: &[u8], signal: &SignalMessageRef) {
        if !self.config.audit_active {
            return;
        }

        let mut log = RawEnvelopeLog::new(
            signal.ref_to_message_id.clone(),
            EnvelopeKind::Response,
            wire.to_vec(),
            self.time_source.now(),
        );
        log.signal_message_id = signal.signal_message_id.clone();
        match self.append(ctx, &log) {
            Ok(()) => debug!(
                domain = %ctx.domain(),
                message_id = %log.message_id,
                bytes = log.length,
                "[msh-05] Response envelope recorded"
            ),
            Err(e) => warn!(
                domain = %ctx.domain(),
                message_id = %log.message_id,
                error = %e,
                "[msh-05] Unable to record response envelope"
            ),
        }
    }

    fn get_envelopes(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Vec<RawEnvelopeLog>, NonRepudiationError> {
        let kv = self.kv_store.lock();
        Self::scan(&kv, ctx, message_id)?
            .into_iter()
            .enumerate()
            .map(|(index, (_, log))| {
                if log.verify() {
                    Ok(log)
                } else {
                    Err(NonRepudiationError::DigestMismatch {
                        message_id: message_id.clone(),
                        index,
                    })
                }
            })
            .collect()
    }

    fn has_envelopes(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<bool, NonRepudiationError> {
        let kv = self.kv_store.lock();
        Ok(!kv
            .prefix_scan(&keys::envelope_prefix(ctx, message_id))?
            .is_empty())
    }

    fn delete_envelopes(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<usize, NonRepudiationError> {
        let mut kv = self.kv_store.lock();
        let doomed: Vec<Vec<u8>> = kv
            .prefix_scan(&keys::envelope_prefix(ctx, message_id))?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let removed = doomed.len();
        if removed > 0 {
            kv.atomic_batch_write(doomed.into_iter().map(BatchOperation::delete).collect())?;
            debug!(
                domain = %ctx.domain(),
                message_id = %message_id,
                removed,
                "[msh-05] Envelopes deleted"
            );
        }
        Ok(removed)
    }
}
