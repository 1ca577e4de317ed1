//! # Inbound Ports (Driving Ports)

use crate::domain::errors::LegConfigurationError;
use crate::domain::leg::LegConfiguration;
use crate::domain::pmode::PModeConfiguration;
use crate::domain::snapshot::RoutingKey;
use shared_types::{DomainContext, DomainId, MessageId};
use std::sync::Arc;

/// Primary API of the Leg Configuration Resolver.
pub trait LegConfigurationApi: Send + Sync {
    /// Leg for a stored message, pinned for the rest of its delivery.
    ///
    /// # Errors
    /// - `ConfigurationNotFound`: no process matches the routing key
    /// - `DomainNotLoaded`, `UnknownMessage`
    fn resolve(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError>;

    /// Drop the pinned leg so the next `resolve` reads the current PMode.
    fn invalidate(&self, ctx: &DomainContext, message_id: &MessageId);

    /// Leg for a routing key against the current snapshot (not pinned).
    fn resolve_routing(
        &self,
        ctx: &DomainContext,
        key: &RoutingKey,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError>;

    fn find_leg(
        &self,
        ctx: &DomainContext,
        leg_name: &str,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError>;

    /// Validate and atomically install a domain's PMode.
    fn load_domain(
        &self,
        domain: DomainId,
        pmode: PModeConfiguration,
    ) -> Result<(), LegConfigurationError>;

    /// Pure predicate: the leg allows split-and-join.
    fn may_use_split_and_join(&self, leg: &LegConfiguration) -> bool {
        leg.splitting.is_some()
    }

    /// The leg allows split-and-join and the payload exceeds one fragment.
    fn should_split(&self, leg: &LegConfiguration, payload_len: u64) -> bool {
        self.may_use_split_and_join(leg)
            && leg
                .splitting
                .as_ref()
                .map_or(false, |s| payload_len > s.fragment_size)
    }
}
