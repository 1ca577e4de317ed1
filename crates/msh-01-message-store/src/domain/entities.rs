//! # Message Records
//!
//! `Message` is the mutable lifecycle record, `MessageAttempt` the immutable
//! log entry of one delivery attempt. `StatusUpdate` and `AttemptCompletion`
//! describe the only ways a stored message may change.

use serde::{Deserialize, Serialize};
use shared_types::{
    GroupId, MessageId, MessageStatus, MshRole, NotificationStatus, Timestamp,
};

/// Party/service/action quadruple a leg is negotiated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRouting {
    pub from_party: String,
    pub to_party: String,
    pub service: String,
    pub action: String,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub status: MessageStatus,
    pub msh_role: MshRole,
    pub notification_status: NotificationStatus,
    /// Attempts consumed since submission or the last restore.
    pub send_attempts: u32,
    pub send_attempts_max: u32,
    /// Total attempts ever made. Never reset; keys the attempt log.
    pub attempt_sequence: u32,
    /// Earliest time the next attempt may start.
    pub next_attempt: Option<Timestamp>,
    /// Start of the attempt currently in progress.
    pub attempt_started: Option<Timestamp>,
    pub mpc: String,
    pub backend_name: String,
    pub original_sender: Option<String>,
    pub final_recipient: Option<String>,
    pub routing: MessageRouting,
    /// Leg the message was resolved to, once known.
    pub leg_name: Option<String>,
    pub content_type: String,
    /// Split into fragments; never dispatched itself.
    pub source_message: bool,
    pub message_fragment: bool,
    pub group_id: Option<GroupId>,
    pub received: Timestamp,
    pub modified: Timestamp,
    pub restored: Option<Timestamp>,
    pub failed: Option<Timestamp>,
    pub deleted: Option<Timestamp>,
}

impl Message {
    /// Start of the current retry window: the restore date when restored,
    /// otherwise the received date.
    pub fn scheduled_start(&self) -> Timestamp {
        self.restored.unwrap_or(self.received)
    }

    pub fn requires_notification(&self) -> bool {
        self.notification_status == NotificationStatus::Required
    }

    pub fn has_attempts_left(&self) -> bool {
        self.send_attempts < self.send_attempts_max
    }
}

/// Input to `MessageStoreApi::save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: MessageId,
    pub status: MessageStatus,
    pub msh_role: MshRole,
    pub notification_status: NotificationStatus,
    pub send_attempts_max: u32,
    pub mpc: String,
    pub backend_name: String,
    pub original_sender: Option<String>,
    pub final_recipient: Option<String>,
    pub routing: MessageRouting,
    pub leg_name: Option<String>,
    pub content_type: String,
    pub source_message: bool,
    pub message_fragment: bool,
    pub group_id: Option<GroupId>,
    /// Earliest first attempt; `None` means immediately.
    pub next_attempt: Option<Timestamp>,
}

/// Default message partition channel.
pub const DEFAULT_MPC: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultMPC";

impl NewMessage {
    /// A message submitted by a backend for sending.
    pub fn outbound(id: MessageId, routing: MessageRouting) -> Self {
        Self {
            id,
            status: MessageStatus::SendEnqueued,
            msh_role: MshRole::Sending,
            notification_status: NotificationStatus::Required,
            send_attempts_max: 1,
            mpc: DEFAULT_MPC.to_string(),
            backend_name: String::new(),
            original_sender: None,
            final_recipient: None,
            routing,
            leg_name: None,
            content_type: "application/soap+xml".to_string(),
            source_message: false,
            message_fragment: false,
            group_id: None,
            next_attempt: None,
        }
    }

    /// A message received from a partner.
    pub fn inbound(id: MessageId, routing: MessageRouting) -> Self {
        Self {
            status: MessageStatus::Received,
            msh_role: MshRole::Receiving,
            ..Self::outbound(id, routing)
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptStatus {
    Success,
    /// The attempt was cut short (timeout, cancelled).
    Abort,
    Error,
}

/// One immutable attempt log entry, keyed by `(message_id, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttempt {
    pub message_id: MessageId,
    pub sequence: u32,
    pub start: Timestamp,
    pub end: Timestamp,
    pub status: AttemptStatus,
    pub error: Option<String>,
}

impl MessageAttempt {
    /// An attempt that is about to start.
    pub fn started(message_id: MessageId, sequence: u32, start: Timestamp) -> Self {
        Self {
            message_id,
            sequence,
            start,
            end: start,
            status: AttemptStatus::Success,
            error: None,
        }
    }
}

/// Generic compare-and-set update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: MessageStatus,
    /// Overwrites the stored value, `None` clears it.
    pub next_attempt: Option<Timestamp>,
    /// Overrides the consumed-attempts counter.
    pub send_attempts: Option<u32>,
    pub send_attempts_max: Option<u32>,
    pub notification_status: Option<NotificationStatus>,
    /// Stamp the restore date and clear the failed date.
    pub restored: bool,
    /// Moves a source message onto a new fragment group.
    pub group_id: Option<GroupId>,
}

impl StatusUpdate {
    pub fn to(status: MessageStatus) -> Self {
        Self {
            status,
            next_attempt: None,
            send_attempts: None,
            send_attempts_max: None,
            notification_status: None,
            restored: false,
            group_id: None,
        }
    }

    pub fn next_attempt_at(mut self, at: Timestamp) -> Self {
        self.next_attempt = Some(at);
        self
    }

    pub fn with_send_attempts(mut self, attempts: u32) -> Self {
        self.send_attempts = Some(attempts);
        self
    }

    pub fn with_send_attempts_max(mut self, max: u32) -> Self {
        self.send_attempts_max = Some(max);
        self
    }

    pub fn with_notification(mut self, status: NotificationStatus) -> Self {
        self.notification_status = Some(status);
        self
    }

    pub fn restored(mut self) -> Self {
        self.restored = true;
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// How an in-flight attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCompletion {
    /// `SendSuccess`, `WaitingForRetry` or `SendFailure`.
    pub status: MessageStatus,
    pub next_attempt: Option<Timestamp>,
    pub notification_status: Option<NotificationStatus>,
}

impl AttemptCompletion {
    pub fn success() -> Self {
        Self {
            status: MessageStatus::SendSuccess,
            next_attempt: None,
            notification_status: None,
        }
    }

    pub fn retry_at(at: Timestamp) -> Self {
        Self {
            status: MessageStatus::WaitingForRetry,
            next_attempt: Some(at),
            notification_status: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: MessageStatus::SendFailure,
            next_attempt: None,
            notification_status: None,
        }
    }

    pub fn with_notification(mut self, status: NotificationStatus) -> Self {
        self.notification_status = Some(status);
        self
    }
}
