//! # Dispatch Outcomes
//!
//! What the scheduler hands to a dispatch adapter and what comes back.

use msh_01_message_store::MessageRouting;
use shared_types::{GroupId, MessageId};
use std::fmt;
use std::time::Duration;

/// Class of a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The endpoint could not be reached.
    Connection,
    /// No answer within the dispatch timeout.
    Timeout,
    /// The receiver refused the message (client error, bad receipt).
    Rejected,
    /// The receiver failed while processing (server error).
    Remote,
    /// Missing endpoint, payload or leg.
    Configuration,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Remote => "remote",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// Another attempt may succeed.
    pub retryable: bool,
}

impl DispatchFailure {
    pub fn retryable(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retryable: true,
        }
    }

    pub fn fatal(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retryable: false,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::retryable(
            FailureKind::Timeout,
            format!("no response within {} ms", after.as_millis()),
        )
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the receiver. `response` is the raw reply envelope, if any.
    Delivered { response: Option<Vec<u8>> },
    Failed(DispatchFailure),
}

impl DispatchOutcome {
    pub fn delivered() -> Self {
        Self::Delivered { response: None }
    }
}

/// Position of a fragment message within its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    pub group_id: GroupId,
    pub source_message_id: MessageId,
    pub fragment_number: u32,
    pub fragment_count: u32,
    pub compressed: bool,
    /// Content type of the source message.
    pub source_content_type: String,
}

/// A message ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_id: MessageId,
    pub routing: MessageRouting,
    pub mpc: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    pub endpoint: Option<String>,
    pub fragment: Option<FragmentInfo>,
}
