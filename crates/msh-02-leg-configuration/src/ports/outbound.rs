//! # Outbound Ports (Driven Ports)

use crate::domain::errors::LegConfigurationError;
use crate::domain::snapshot::RoutingKey;
use shared_types::{DomainContext, MessageId};

/// What the resolver needs to know about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingInfo {
    pub key: RoutingKey,
    /// Leg recorded at submission, preferred over the routing lookup.
    pub leg_name: Option<String>,
}

/// Looks up a message's routing information.
///
/// Production: backed by the message store.
pub trait RoutingInfoSource: Send + Sync {
    /// `Ok(None)` when the message is unknown.
    fn routing_info(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Option<RoutingInfo>, LegConfigurationError>;
}
