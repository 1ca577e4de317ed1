//! # Leg Configuration Resolver Service


use crate::domain::errors::LegConfigurationError;
use crate::domain::leg::LegConfiguration;
use crate::domain::pmode::PModeConfiguration;
use crate::domain::snapshot::{PModeSnapshot, RoutingKey};
use crate::ports::inbound::LegConfigurationApi;
use crate::ports::outbound::RoutingInfoSource;
use parking_lot::{Mutex, RwLock};
use shared_types::{DomainContext, DomainId, MessageId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves legs against per-domain PMode snapshots.
pub struct LegConfigurationResolver<R: RoutingInfoSource> {
    routing: R,
    snapshots: RwLock<HashMap<DomainId, Arc<PModeSnapshot>>>,
    pinned: Mutex<HashMap<(DomainId, MessageId), Arc<LegConfiguration>>>,
}

impl<R: RoutingInfoSource> LegConfigurationResolver<R> {
    pub fn new(routing: R) -> Self {
        Self {
            routing,
            snapshots: RwLock::new(HashMap::new()),
            pinned: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot(&self, ctx: &DomainContext) -> Result<Arc<PModeSnapshot>, LegConfigurationError> {
        self.snapshots
            .read()
            .get(ctx.domain())
            .cloned()
            .ok_or_else(|| LegConfigurationError::DomainNotLoaded {
                domain: ctx.domain().clone(),
            })
    }

    /// Number of messages with a pinned leg.
    pub fn pinned_count(&self) -> usize {
        self.pinned.lock().len()
    }
}

impl<R: RoutingInfoSource> LegConfigurationApi for LegConfigurationResolver<R> {
    fn resolve(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError> {
        let pin_key = (ctx.domain().clone(), message_id.clone());
        if let Some(leg) = self.pinned.lock().get(&pin_key) {
            return Ok(leg.clone());
        }

        let info = self
            .routing
            .routing_info(ctx, message_id)?
            .ok_or_else(|| LegConfigurationError::UnknownMessage {
                id: message_id.clone(),
            })?;
        let snapshot = self.snapshot(ctx)?;
        let leg = info
            .leg_name
            .as_deref()
            .and_then(|name| snapshot.named_route(name, &info.key.to_party))
            .or_else(|| snapshot.route(&info.key))
            .ok_or_else(|| LegConfigurationError::ConfigurationNotFound {
                key: info.key.to_string(),
            })?;

        debug!(
            domain = %ctx.domain(),
            message_id = %message_id,
            leg = %leg.name,
            "[msh-02] leg resolved"
        );
        // A concurrent resolve may have pinned first; keep that one.
        let pinned = self.pinned.lock().entry(pin_key).or_insert(leg).clone();
        Ok(pinned)
    }

    fn invalidate(&self, ctx: &DomainContext, message_id: &MessageId) {
        self.pinned
            .lock()
            .remove(&(ctx.domain().clone(), message_id.clone()));
    }

    fn resolve_routing(
        &self,
        ctx: &DomainContext,
        key: &RoutingKey,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError> {
        self.snapshot(ctx)?
            .route(key)
            .ok_or_else(|| LegConfigurationError::ConfigurationNotFound {
                key: key.to_string(),
            })
    }

    fn find_leg(
        &self,
        ctx: &DomainContext,
        leg_name: &str,
    ) -> Result<Arc<LegConfiguration>, LegConfigurationError> {
        self.snapshot(ctx)?
            .leg(leg_name)
            .ok_or_else(|| LegConfigurationError::LegNotFound {
                name: leg_name.to_string(),
            })
    }

    fn load_domain(
        &self,
        domain: DomainId,
        pmode: PModeConfiguration,
    ) -> Result<(), LegConfigurationError> {
        let snapshot = Arc::new(PModeSnapshot::build(&pmode)?);
        info!(
            domain = %domain,
            legs = snapshot.leg_count(),
            "[msh-02] PMode loaded"
        );
        self.snapshots.write().insert(domain, snapshot);
        Ok(())
    }
}
