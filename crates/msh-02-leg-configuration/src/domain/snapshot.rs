//! # PMode Snapshot
//!
//! Validated, indexed, immutable view of one PMode document.

use super::errors::LegConfigurationError;
use super::leg::LegConfiguration;
use super::pmode::PModeConfiguration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Party/service/action quadruple a leg is looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    pub from_party: String,
    pub to_party: String,
    pub service: String,
    pub action: String,
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{} / {}]",
            self.from_party, self.to_party, self.service, self.action
        )
    }
}

/// Indexed PMode.
#[derive(Debug, Default)]
pub struct PModeSnapshot {
    endpoints: HashMap<String, String>,
    legs: HashMap<String, Arc<LegConfiguration>>,
    routes: HashMap<RoutingKey, Arc<LegConfiguration>>,
}

impl PModeSnapshot {
    /// Validate a PMode and build the routing index.
    ///
    /// Every process leg and party must exist, splitting fragments must be
    /// non-empty, and a routing key may map to only one leg.
    pub fn build(pmode: &PModeConfiguration) -> Result<Self, LegConfigurationError> {
        let invalid = |reason: String| LegConfigurationError::InvalidPMode { reason };

        let endpoints: HashMap<&str, &str> = pmode
            .parties
            .iter()
            .map(|p| (p.name.as_str(), p.endpoint.as_str()))
            .collect();

        let mut legs = HashMap::new();
        for leg in &pmode.legs {
            if let Some(splitting) = &leg.splitting {
                if splitting.fragment_size == 0 {
                    return Err(invalid(format!("leg {} has fragment_size 0", leg.name)));
                }
            }
            if legs.insert(leg.name.clone(), Arc::new(leg.clone())).is_some() {
                return Err(invalid(format!("duplicate leg {}", leg.name)));
            }
        }

        let mut routes = HashMap::new();
        for process in &pmode.processes {
            for leg_name in &process.legs {
                let leg = legs.get(leg_name).ok_or_else(|| {
                    invalid(format!("process {} references unknown leg {}", process.name, leg_name))
                })?;
                for from in &process.initiator_parties {
                    if !endpoints.contains_key(from.as_str()) {
                        return Err(invalid(format!("unknown party {}", from)));
                    }
                    for to in &process.responder_parties {
                        let endpoint = endpoints
                            .get(to.as_str())
                            .ok_or_else(|| invalid(format!("unknown party {}", to)))?;
                        let key = RoutingKey {
                            from_party: from.clone(),
                            to_party: to.clone(),
                            service: leg.service.clone(),
                            action: leg.action.clone(),
                        };
                        let mut resolved = (**leg).clone();
                        if resolved.endpoint.is_none() {
                            resolved.endpoint = Some((*endpoint).to_string());
                        }
                        if routes.insert(key.clone(), Arc::new(resolved)).is_some() {
                            return Err(invalid(format!("ambiguous routing for {}", key)));
                        }
                    }
                }
            }
        }

        let endpoints = endpoints
            .into_iter()
            .map(|(name, endpoint)| (name.to_string(), endpoint.to_string()))
            .collect();
        Ok(Self {
            endpoints,
            legs,
            routes,
        })
    }

    /// Leg for a routing key, endpoint filled in.
    pub fn route(&self, key: &RoutingKey) -> Option<Arc<LegConfiguration>> {
        self.routes.get(key).cloned()
    }

    /// Leg as defined, by name.
    pub fn leg(&self, name: &str) -> Option<Arc<LegConfiguration>> {
        self.legs.get(name).cloned()
    }

    /// Named leg sent to `to_party`, endpoint filled in.
    pub fn named_route(&self, name: &str, to_party: &str) -> Option<Arc<LegConfiguration>> {
        let leg = self.legs.get(name)?;
        if leg.endpoint.is_some() {
            return Some(leg.clone());
        }
        let mut resolved = (**leg).clone();
        resolved.endpoint = Some(self.endpoints.get(to_party)?.clone());
        Some(Arc::new(resolved))
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}
