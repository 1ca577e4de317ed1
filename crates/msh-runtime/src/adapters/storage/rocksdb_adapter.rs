//! # RocksDB Storage Adapter
//!
//! [`KeyValueStore`] over one RocksDB instance shared by every subsystem.
//! Keys already carry `<domain>/<section>/`, so the default column family is
//! enough.
//!
//! - Atomic batch writes (`WriteBatch`)
//! - Snappy compression, bloom filters
//! - Optional fsync on every write

use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use shared_types::{BatchOperation, KVStoreError, KeyValueStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    /// Fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/rocksdb"),
            block_cache_size: 128 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

/// Clones share the same database.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
            message: format!("Failed to open RocksDB at {}: {}", config.path.display(), e),
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let db = self.db.read();
        db.get(key).map_err(|e| KVStoreError::IOError {
            message: format!("RocksDB get failed: {}", e),
        })
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let db = self.db.write();
        db.put_opt(key, value, &self.write_options())
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB put failed: {}", e),
            })
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        let db = self.db.write();
        db.delete_opt(key, &self.write_options())
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB delete failed: {}", e),
            })
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        db.write_opt(batch, &self.write_options())
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB batch write failed: {}", e),
            })
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        let db = self.db.read();
        db.get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB exists check failed: {}", e),
            })
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let db = self.db.read();
        let mut results = Vec::new();
        for item in db.iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward)) {
            let (key, value) = item.map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB scan failed: {}", e),
            })?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        let second = first.clone();

        first.put(b"default/msg/a", b"1").unwrap();
        first.put(b"default/msg/b", b"2").unwrap();
        first.put(b"default/nrr/a/0", b"3").unwrap();

        let rows = second.prefix_scan(b"default/msg/").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, b"1".to_vec());
    }

    #[test]
    fn test_batch_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        store.put(b"k1", b"old").unwrap();

        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"k2".to_vec(), b"new".to_vec()),
                BatchOperation::delete(b"k1".to_vec()),
            ])
            .unwrap();

        assert!(!store.exists(b"k1").unwrap());
        assert_eq!(store.get(b"k2").unwrap(), Some(b"new".to_vec()));
    }
}
