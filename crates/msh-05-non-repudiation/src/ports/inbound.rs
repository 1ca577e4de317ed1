//! # Inbound Ports (Driving Ports)

use crate::domain::entities::{RawEnvelopeLog, SignalMessageRef, UserMessageRef};
use crate::domain::errors::NonRepudiationError;
use shared_types::{DomainContext, MessageId};

/// Evidence of what went over the wire.
///
/// The two `save_*` operations are fire-and-forget: they return nothing,
/// log their own failures and must never hold up message delivery.
pub trait NonRepudiationApi: Send + Sync {
    /// Record an outgoing or incoming user message envelope.
    fn save_request(&self, ctx: &DomainContext, wire: &[u8], user_message: &UserMessageRef);

    /// Record the signal envelope answering a user message.
    fn save_response(&self, ctx: &DomainContext, wire: &[u8], signal: &SignalMessageRef);

    /// Recorded envelopes of a user message, oldest first.
    ///
    /// # Errors
    /// - `DigestMismatch`: a stored envelope was altered
    fn get_envelopes(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Vec<RawEnvelopeLog>, NonRepudiationError>;

    fn has_envelopes(&self, ctx: &DomainContext, message_id: &MessageId)
        -> Result<bool, NonRepudiationError>;

    /// Drop every envelope of a user message. Returns how many were removed.
    fn delete_envelopes(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<usize, NonRepudiationError>;
}
