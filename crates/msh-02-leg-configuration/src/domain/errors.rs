//! # Domain Errors

use shared_types::{DomainId, MessageId};
use thiserror::Error;

/// Errors from leg resolution and PMode loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegConfigurationError {
    /// No negotiated process matches the routing key. Fatal for the message.
    #[error("No leg configuration for {key}")]
    ConfigurationNotFound { key: String },

    #[error("No PMode loaded for domain {domain}")]
    DomainNotLoaded { domain: DomainId },

    #[error("Leg not found: {name}")]
    LegNotFound { name: String },

    /// The routing source knows nothing about this message.
    #[error("No routing information for message {id}")]
    UnknownMessage { id: MessageId },

    #[error("Routing lookup failed: {message}")]
    RoutingLookup { message: String },

    #[error("Invalid PMode: {reason}")]
    InvalidPMode { reason: String },
}
