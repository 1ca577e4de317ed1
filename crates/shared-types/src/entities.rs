//! # Core Domain Entities
//!
//! Identifiers and lifecycle enums shared by every subsystem.
//!
//! ## Clusters
//!
//! - **Tenancy**: `DomainId`, `DomainContext`
//! - **Identity**: `MessageId`, `GroupId`
//! - **Lifecycle**: `MessageStatus`, `MshRole`, `NotificationStatus`

use crate::errors::IdentifierError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the UNIX epoch.
pub type Timestamp = u64;

// =============================================================================
// CLUSTER A: TENANCY
// =============================================================================

/// Code of the domain used when none is configured.
pub const DEFAULT_DOMAIN: &str = "default";

/// Maximum length of a domain code.
pub const MAX_DOMAIN_CODE_LEN: usize = 50;

/// A tenant identifier.
///
/// Codes are lowercase ASCII letters, digits, `_` and `-` so they can be used
/// verbatim as a key namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainId(String);

impl DomainId {
    /// Validate and build a domain id.
    pub fn new(code: impl Into<String>) -> Result<Self, IdentifierError> {
        let code = code.into();
        if code.is_empty() || code.len() > MAX_DOMAIN_CODE_LEN {
            return Err(IdentifierError::InvalidDomain { code });
        }
        let valid = code
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if !valid {
            return Err(IdentifierError::InvalidDomain { code });
        }
        Ok(Self(code))
    }

    /// The default single-tenant domain.
    pub fn default_domain() -> Self {
        Self(DEFAULT_DOMAIN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DomainId {
    fn default() -> Self {
        Self::default_domain()
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-operation tenant handle.
///
/// Every store, resolver, fragment, scheduler and recorder operation takes a
/// `&DomainContext`; all persisted keys are namespaced by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainContext {
    domain: DomainId,
}

impl DomainContext {
    pub fn new(domain: DomainId) -> Self {
        Self { domain }
    }

    /// Context bound to the default domain.
    pub fn default_domain() -> Self {
        Self::new(DomainId::default_domain())
    }

    pub fn domain(&self) -> &DomainId {
        &self.domain
    }

    /// Key namespace for this domain: `<code>/<section>/`.
    pub fn key_prefix(&self, section: &str) -> Vec<u8> {
        format!("{}/{}/", self.domain.as_str(), section).into_bytes()
    }
}

impl fmt::Display for DomainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.domain.fmt(f)
    }
}

// =============================================================================
// CLUSTER B: IDENTITY
// =============================================================================

/// Maximum length of an ebMS message id.
pub const MAX_MESSAGE_ID_LEN: usize = 255;

/// Globally unique ebMS message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Validate and build a message id.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdentifierError::EmptyMessageId);
        }
        if id.len() > MAX_MESSAGE_ID_LEN {
            return Err(IdentifierError::MessageIdTooLong {
                len: id.len(),
                max: MAX_MESSAGE_ID_LEN,
            });
        }
        // '/' is the key separator
        if id.chars().any(|c| c.is_control() || c == '/') {
            return Err(IdentifierError::InvalidMessageId { id });
        }
        Ok(Self(id))
    }

    /// Generate a fresh id of the form `<uuid-v4>@<suffix>`.
    pub fn generate(suffix: &str) -> Self {
        Self(format!("{}@{}", uuid::Uuid::new_v4(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a split-and-join message group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.trim().is_empty() || id.chars().any(|c| c.is_control() || c == '/') {
            return Err(IdentifierError::InvalidGroupId { id });
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CLUSTER C: LIFECYCLE
// =============================================================================

/// Status of a message log entry.
///
/// ```text
/// SUBMITTED/SEND_ENQUEUED ──→ SEND_IN_PROGRESS ──→ SEND_SUCCESS
///          ↑                        │   │
///          │                        │   └──→ SEND_FAILURE ──restore──┐
///          └──── WAITING_FOR_RETRY ←┘                                │
///          └─────────────────────────────────────────────────────────┘
/// SEND_SUCCESS / SEND_FAILURE / RECEIVED ──delete──→ DELETED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Accepted from a backend, not yet queued.
    Submitted,
    /// Queued for its first (or a restored) attempt.
    SendEnqueued,
    /// An attempt is running. At most one per message.
    SendInProgress,
    /// Last attempt failed; the next one is due at `next_attempt`.
    WaitingForRetry,
    /// Delivered.
    SendSuccess,
    /// Attempts exhausted or non-retryable failure. Restorable.
    SendFailure,
    /// Received from a partner (receiving role).
    Received,
    /// Reception could not be completed (e.g. a broken fragment group).
    ReceivedFailure,
    /// Explicitly deleted.
    Deleted,
}

impl MessageStatus {
    /// Whether the scheduler may start an attempt from this status.
    pub fn is_schedulable(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::SendEnqueued | Self::WaitingForRetry
        )
    }

    /// Whether no further scheduler transition happens without admin action.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SendSuccess
                | Self::SendFailure
                | Self::Received
                | Self::ReceivedFailure
                | Self::Deleted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::SendEnqueued => "SEND_ENQUEUED",
            Self::SendInProgress => "SEND_IN_PROGRESS",
            Self::WaitingForRetry => "WAITING_FOR_RETRY",
            Self::SendSuccess => "SEND_SUCCESS",
            Self::SendFailure => "SEND_FAILURE",
            Self::Received => "RECEIVED",
            Self::ReceivedFailure => "RECEIVED_FAILURE",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the exchange this gateway plays for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MshRole {
    Sending,
    Receiving,
}

/// Whether the submitting backend wants success/failure notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationStatus {
    Required,
    NotRequired,
    Notified,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_id_validation() {
        assert!(DomainId::new("red").is_ok());
        assert!(DomainId::new("tenant_2-b").is_ok());
        assert!(DomainId::new("").is_err());
        assert!(DomainId::new("Red").is_err());
        assert!(DomainId::new("a/b").is_err());
        assert!(DomainId::new("x".repeat(51)).is_err());
    }

    #[test]
    fn test_key_prefix_is_namespaced() {
        let red = DomainContext::new(DomainId::new("red").unwrap());
        let blue = DomainContext::new(DomainId::new("blue").unwrap());
        assert_eq!(red.key_prefix("msg"), b"red/msg/".to_vec());
        assert_ne!(red.key_prefix("msg"), blue.key_prefix("msg"));
    }

    #[test]
    fn test_message_id_validation() {
        assert!(MessageId::new("abc@domibus.eu").is_ok());
        assert!(MessageId::new("   ").is_err());
        assert!(MessageId::new("a/b").is_err());
        assert!(MessageId::new("a\nb").is_err());
        assert!(matches!(
            MessageId::new("x".repeat(256)),
            Err(IdentifierError::MessageIdTooLong { len: 256, .. })
        ));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = MessageId::generate("msh");
        let b = MessageId::generate("msh");
        assert_ne!(a, b);
        assert!(a.as_str().ends_with("@msh"));
    }

    #[test]
    fn test_status_predicates() {
        assert!(MessageStatus::WaitingForRetry.is_schedulable());
        assert!(MessageStatus::SendEnqueued.is_schedulable());
        assert!(!MessageStatus::SendInProgress.is_schedulable());
        assert!(!MessageStatus::SendFailure.is_schedulable());
        assert!(MessageStatus::SendFailure.is_terminal());
        assert!(MessageStatus::Deleted.is_terminal());
        assert!(!MessageStatus::WaitingForRetry.is_terminal());
    }
}
