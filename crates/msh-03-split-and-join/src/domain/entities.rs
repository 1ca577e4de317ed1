//! # Group and Fragment Records

use serde::{Deserialize, Serialize};
use shared_types::{GroupId, MessageId, MshRole, Timestamp};
use std::path::PathBuf;

/// Lifecycle of a message group.
///
/// ```text
/// sending side:    Sending ──all fragments sent──→ Sent
///                     └────any fragment failed───→ Failed
/// receiving side:  Receiving ──rejoin──→ Rejoined
///                     ├──join interval elapsed──→ Expired
///                     └──rejoin failed─────────→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    Sending,
    Sent,
    Failed,
    Receiving,
    Rejoined,
    Expired,
}

impl GroupState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Sending | Self::Receiving)
    }
}

/// A source message split into fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageGroup {
    pub group_id: GroupId,
    pub source_message_id: MessageId,
    pub msh_role: MshRole,
    pub state: GroupState,
    /// Declared number of fragments. Never zero.
    pub fragment_count: u32,
    pub sent_fragments: u32,
    /// Size of the (uncompressed) source message.
    pub message_size: u64,
    /// Fragments carry the zstd-compressed source message.
    pub compressed: bool,
    /// `multipart/related` content type of the source message.
    pub content_type: String,
    pub source_file: Option<PathBuf>,
    pub join_interval_ms: u64,
    pub created: Timestamp,
    pub rejoined_file: Option<PathBuf>,
    pub rejoined_checksum: Option<u32>,
}

impl MessageGroup {
    /// Group for an outbound source message.
    pub fn outbound(
        group_id: GroupId,
        source_message_id: MessageId,
        fragment_count: u32,
        content_type: String,
    ) -> Self {
        Self {
            group_id,
            source_message_id,
            msh_role: MshRole::Sending,
            state: GroupState::Sending,
            fragment_count,
            sent_fragments: 0,
            message_size: 0,
            compressed: false,
            content_type,
            source_file: None,
            join_interval_ms: 0,
            created: 0,
            rejoined_file: None,
            rejoined_checksum: None,
        }
    }

    /// Group announced by the first inbound fragment.
    pub fn inbound(
        group_id: GroupId,
        source_message_id: MessageId,
        fragment_count: u32,
        content_type: String,
    ) -> Self {
        Self {
            msh_role: MshRole::Receiving,
            state: GroupState::Receiving,
            ..Self::outbound(group_id, source_message_id, fragment_count, content_type)
        }
    }

    /// Same declared shape as `other`.
    pub(crate) fn agrees_with(&self, other: &MessageGroup) -> bool {
        self.source_message_id == other.source_message_id
            && self.fragment_count == other.fragment_count
            && self.compressed == other.compressed
            && self.content_type == other.content_type
    }
}

/// One fragment of a group, with the digest of its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFragmentEntity {
    pub group_id: GroupId,
    /// 0-based, contiguous, unique within the group.
    pub fragment_number: u32,
    /// The fragment's own ebMS message id.
    pub message_id: MessageId,
    pub file: PathBuf,
    pub length: u64,
    pub checksum: u32,
}

/// Result of registering one inbound fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRegistration {
    pub fragment: MessageFragmentEntity,
    /// Every declared fragment is now registered.
    pub complete: bool,
}

/// Result of cutting a source message into fragment files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub files: Vec<PathBuf>,
    pub message_size: u64,
    pub compressed: bool,
}
