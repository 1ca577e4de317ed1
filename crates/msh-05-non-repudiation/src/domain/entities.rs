//! Raw envelope records.

use serde::{Deserialize, Serialize};
use shared_types::{MessageId, Timestamp};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// The user message as it went on (or came off) the wire.
    Request,
    /// The signal (receipt or error) answering it.
    Response,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Request => f.write_str("REQUEST"),
            EnvelopeKind::Response => f.write_str("RESPONSE"),
        }
    }
}

/// The user message a request envelope carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessageRef {
    pub message_id: MessageId,
}

impl UserMessageRef {
    pub fn new(message_id: MessageId) -> Self {
        Self { message_id }
    }
}

/// The signal a response envelope carries.
///
/// Responses are filed under the user message they answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessageRef {
    /// Id of the signal itself, when the transport exposed one.
    pub signal_message_id: Option<MessageId>,
    pub ref_to_message_id: MessageId,
}

impl SignalMessageRef {
    pub fn answering(ref_to_message_id: MessageId) -> Self {
        Self {
            signal_message_id: None,
            ref_to_message_id,
        }
    }

    pub fn with_signal_id(mut self, id: MessageId) -> Self {
        self.signal_message_id = Some(id);
        self
    }
}

/// One recorded envelope, byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelopeLog {
    /// The user message this envelope belongs to.
    pub message_id: MessageId,
    pub signal_message_id: Option<MessageId>,
    pub kind: EnvelopeKind,
    pub raw: Vec<u8>,
    pub length: u64,
    /// CRC32 of `raw`.
    pub digest: u32,
    pub created: Timestamp,
}

impl RawEnvelopeLog {
    pub fn new(message_id: MessageId, kind: EnvelopeKind, raw: Vec<u8>, created: Timestamp) -> Self {
        Self {
            message_id,
            signal_message_id: None,
            kind,
            length: raw.len() as u64,
            digest: crc32fast::hash(&raw),
            raw,
            created,
        }
    }

    /// The stored bytes still match their length and digest.
    pub fn verify(&self) -> bool {
        self.raw.len() as u64 == self.length && crc32fast::hash(&self.raw) == self.digest
    }
}
