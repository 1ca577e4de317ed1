//! # Gateway Events
//!
//! Every event that flows through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::{DomainId, GroupId, MessageId, MessageStatus, Timestamp};

/// Events published by the MSH core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    // =========================================================================
    // LIFECYCLE (always published)
    // =========================================================================
    /// A message changed status.
    MessageStatusChanged {
        domain: DomainId,
        message_id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
        at: Timestamp,
    },

    // =========================================================================
    // BACKEND NOTIFICATIONS (only for messages requiring notification)
    // =========================================================================
    /// A user message was delivered.
    MessageSendSuccess {
        domain: DomainId,
        message_id: MessageId,
        backend: String,
    },

    /// A user message became a terminal failure.
    MessageSendFailure {
        domain: DomainId,
        message_id: MessageId,
        backend: String,
        error: String,
    },

    /// A user message was received (including a rejoined source message).
    MessageReceived {
        domain: DomainId,
        message_id: MessageId,
        backend: String,
    },

    /// One fragment of a split source message was delivered.
    MessageFragmentSendSuccess {
        domain: DomainId,
        message_id: MessageId,
        group_id: GroupId,
        backend: String,
    },

    /// One fragment of a split source message failed for good.
    MessageFragmentSendFailure {
        domain: DomainId,
        message_id: MessageId,
        group_id: GroupId,
        backend: String,
        error: String,
    },

    // =========================================================================
    // SPLIT AND JOIN
    // =========================================================================
    /// All fragments of a group arrived and the source message was rebuilt.
    SourceMessageRejoined {
        domain: DomainId,
        group_id: GroupId,
        message_id: MessageId,
    },

    /// Rejoin of a complete group failed. Never retried automatically.
    RejoinFailed {
        domain: DomainId,
        group_id: GroupId,
        error: String,
    },
}

impl GatewayEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::MessageStatusChanged { .. } => EventTopic::StatusChange,
            Self::MessageSendSuccess { .. }
            | Self::MessageSendFailure { .. }
            | Self::MessageReceived { .. }
            | Self::MessageFragmentSendSuccess { .. }
            | Self::MessageFragmentSendFailure { .. } => EventTopic::BackendNotification,
            Self::SourceMessageRejoined { .. } | Self::RejoinFailed { .. } => {
                EventTopic::SplitAndJoin
            }
        }
    }

    /// Domain the event belongs to.
    #[must_use]
    pub fn domain(&self) -> &DomainId {
        match self {
            Self::MessageStatusChanged { domain, .. }
            | Self::MessageSendSuccess { domain, .. }
            | Self::MessageSendFailure { domain, .. }
            | Self::MessageReceived { domain, .. }
            | Self::MessageFragmentSendSuccess { domain, .. }
            | Self::MessageFragmentSendFailure { domain, .. }
            | Self::SourceMessageRejoined { domain, .. }
            | Self::RejoinFailed { domain, .. } => domain,
        }
    }

    /// Message the event is about, if any.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::MessageStatusChanged { message_id, .. }
            | Self::MessageSendSuccess { message_id, .. }
            | Self::MessageSendFailure { message_id, .. }
            | Self::MessageReceived { message_id, .. }
            | Self::MessageFragmentSendSuccess { message_id, .. }
            | Self::MessageFragmentSendFailure { message_id, .. }
            | Self::SourceMessageRejoined { message_id, .. } => Some(message_id),
            Self::RejoinFailed { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    StatusChange,
    BackendNotification,
    SplitAndJoin,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Domains to include. Empty means all domains.
    pub domains: Vec<DomainId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            domains: Vec::new(),
        }
    }

    /// Restrict the filter to one domain.
    #[must_use]
    pub fn in_domain(mut self, domain: DomainId) -> Self {
        self.domains.push(domain);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &GatewayEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let domain_match = self.domains.is_empty() || self.domains.contains(event.domain());

        topic_match && domain_match
    }
}
