//! Routing lookup for the leg resolver, backed by the message store.

use msh_01_message_store::MessageStoreApi;
use msh_02_leg_configuration::{LegConfigurationError, RoutingInfo, RoutingInfoSource, RoutingKey};
use shared_types::{DomainContext, MessageId};
use std::sync::Arc;

pub struct StoreRoutingInfo<S: MessageStoreApi + ?Sized> {
    store: Arc<S>,
}

impl<S: MessageStoreApi + ?Sized> StoreRoutingInfo<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: MessageStoreApi + ?Sized> RoutingInfoSource for StoreRoutingInfo<S> {
    fn routing_info(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Option<RoutingInfo>, LegConfigurationError> {
        let message = self
            .store
            .find_message(ctx, message_id)
            .map_err(|e| LegConfigurationError::RoutingLookup {
                message: e.to_string(),
            })?;

        Ok(message.map(|m| RoutingInfo {
            key: RoutingKey {
                from_party: m.routing.from_party,
                to_party: m.routing.to_party,
                service: m.routing.service,
                action: m.routing.action,
            },
            leg_name: m.leg_name,
        }))
    }
}
