//! Bincode record codec.

use crate::domain::errors::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}
