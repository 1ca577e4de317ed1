//! # Submissions
//!
//! Messages entering the scheduler: outbound submissions from a backend and
//! fragments arriving from a remote gateway.

use msh_01_message_store::MessageRouting;
use msh_03_split_and_join::SplitAndJoinError;
use shared_types::{GroupId, MessageId};

/// An outbound user message handed over by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Generated when absent.
    pub message_id: Option<MessageId>,
    pub routing: MessageRouting,
    pub payload: Vec<u8>,
    pub content_type: String,
    pub backend_name: String,
    pub original_sender: Option<String>,
    pub final_recipient: Option<String>,
    /// Overrides the leg's default MPC.
    pub mpc: Option<String>,
    pub notify_backend: bool,
}

impl Submission {
    pub fn new(routing: MessageRouting, payload: Vec<u8>) -> Self {
        Self {
            message_id: None,
            routing,
            payload,
            content_type: "application/soap+xml".to_string(),
            backend_name: String::new(),
            original_sender: None,
            final_recipient: None,
            mpc: None,
            notify_backend: true,
        }
    }

    pub fn with_message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn from_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend_name = backend.into();
        self
    }

    pub fn with_original_sender(mut self, sender: impl Into<String>) -> Self {
        self.original_sender = Some(sender.into());
        self
    }

    pub fn with_final_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.final_recipient = Some(recipient.into());
        self
    }

    pub fn without_notification(mut self) -> Self {
        self.notify_backend = false;
        self
    }
}

/// One fragment received from a remote gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFragment {
    /// The fragment's own message id.
    pub message_id: MessageId,
    pub group_id: GroupId,
    pub source_message_id: MessageId,
    pub fragment_number: u32,
    pub fragment_count: u32,
    pub compressed: bool,
    pub source_content_type: String,
    pub join_interval_ms: u64,
    pub routing: MessageRouting,
    pub backend_name: String,
    pub payload: Vec<u8>,
}

/// What became of the group after a fragment was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejoinOutcome {
    /// More fragments are expected.
    Pending,
    /// The source message was rebuilt and stored as `Received`.
    Rejoined(MessageId),
    /// The group is complete but structurally broken; it is now failed.
    Failed(SplitAndJoinError),
    /// The group is complete but the rejoin hit an environmental error.
    /// The group stays `Receiving` and recovery or maintenance tries again.
    Deferred { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentAcceptance {
    pub fragment_message_id: MessageId,
    pub rejoin: RejoinOutcome,
}

/// Result of one scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptReport {
    /// Not due, already in flight, terminal, or a split source message.
    Skipped,
    Delivered,
    Retrying { at: shared_types::Timestamp },
    Failed,
    /// The message changed under the attempt (deleted, restored) and the
    /// outcome was discarded.
    Cancelled,
}
