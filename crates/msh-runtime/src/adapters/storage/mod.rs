//! # Storage Backends
//!
//! Opens one [`KeyValueStore`] per subsystem for the configured backend.
//!
//! | Backend | Layout |
//! |---------|--------|
//! | `file` | `messages.db`, `fragments.db`, `envelopes.db` under the data dir |
//! | `rocksdb` | one database at `<data dir>/rocksdb`, shared |
//! | `memory` | nothing on disk |

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::config::{GatewayConfig, StorageBackend};
use shared_types::{FileBackedKVStore, InMemoryKVStore, KVStoreError, KeyValueStore};
use std::path::Path;
use tracing::info;

pub type DynStore = Box<dyn KeyValueStore>;

pub struct GatewayStores {
    pub messages: DynStore,
    pub fragments: DynStore,
    pub envelopes: DynStore,
}

pub fn open_stores(config: &GatewayConfig) -> Result<GatewayStores, KVStoreError> {
    let stores = match config.storage_backend {
        StorageBackend::Memory => GatewayStores {
            messages: Box::new(InMemoryKVStore::new()),
            fragments: Box::new(InMemoryKVStore::new()),
            envelopes: Box::new(InMemoryKVStore::new()),
        },
        StorageBackend::File => {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| KVStoreError::IOError {
                message: format!("create {}: {}", config.data_dir.display(), e),
            })?;
            GatewayStores {
                messages: Box::new(FileBackedKVStore::open(config.data_dir.join("messages.db"))?),
                fragments: Box::new(FileBackedKVStore::open(config.data_dir.join("fragments.db"))?),
                envelopes: Box::new(FileBackedKVStore::open(config.data_dir.join("envelopes.db"))?),
            }
        }
        StorageBackend::RocksDb => open_rocksdb(config)?,
    };
    info!(
        backend = ?config.storage_backend,
        data_dir = %config.data_dir.display(),
        "[msh-runtime] Storage opened"
    );
    Ok(stores)
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(config: &GatewayConfig) -> Result<GatewayStores, KVStoreError> {
    let db = RocksDbStore::open(RocksDbConfig {
        path: config.data_dir.join("rocksdb"),
        ..RocksDbConfig::default()
    })?;
    Ok(GatewayStores {
        messages: Box::new(db.clone()),
        fragments: Box::new(db.clone()),
        envelopes: Box::new(db),
    })
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_config: &GatewayConfig) -> Result<GatewayStores, KVStoreError> {
    Err(KVStoreError::IOError {
        message: "built without the `rocksdb` feature".to_string(),
    })
}

/// Share of the file system holding `path` that is still free.
pub fn available_disk_space_percent(path: &Path) -> std::io::Result<u8> {
    let available = fs2::available_space(path)?;
    let total = fs2::total_space(path)?;
    if total == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "unable to determine disk space",
        ));
    }
    Ok(((available as f64 / total as f64) * 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            data_dir: dir.path().join("nested"),
            ..GatewayConfig::default()
        };

        let mut stores = open_stores(&config).unwrap();
        stores.messages.put(b"default/msg/a", b"1").unwrap();

        assert!(config.data_dir.is_dir());
        assert!(stores.fragments.get(b"default/msg/a").unwrap().is_none());
    }

    #[test]
    fn test_disk_space_is_a_percentage() {
        let dir = tempfile::tempdir().unwrap();
        let percent = available_disk_space_percent(dir.path()).unwrap();
        assert!(percent <= 100);
    }
}
