//! PMode document model (JSON).

use super::errors::LegConfigurationError;
use super::leg::LegConfiguration;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDefinition {
    pub name: String,
    /// Receiving endpoint of the party's gateway.
    pub endpoint: String,
}

/// A negotiated business process: who may send which legs to whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    pub initiator_parties: Vec<String>,
    pub responder_parties: Vec<String>,
    /// Leg names.
    pub legs: Vec<String>,
}

/// One domain's PMode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PModeConfiguration {
    #[serde(default)]
    pub parties: Vec<PartyDefinition>,
    #[serde(default)]
    pub legs: Vec<LegConfiguration>,
    #[serde(default)]
    pub processes: Vec<ProcessDefinition>,
}

impl PModeConfiguration {
    pub fn from_json(json: &str) -> Result<Self, LegConfigurationError> {
        serde_json::from_str(json).map_err(|e| LegConfigurationError::InvalidPMode {
            reason: e.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, LegConfigurationError> {
        let json = std::fs::read_to_string(path).map_err(|e| LegConfigurationError::InvalidPMode {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}
