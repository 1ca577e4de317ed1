//! # Key-Value Persistence Port
//!
//! The one storage contract every subsystem writes through. Keys are raw
//! bytes; subsystems build them as `<domain>/<section>/<id>...` so a
//! `prefix_scan` over a domain section never sees another tenant's rows.
//!
//! | Adapter              | Use                         | Durable |
//! |----------------------|-----------------------------|---------|
//! | `InMemoryKVStore`    | unit and integration tests  | no      |
//! | `FileBackedKVStore`  | single node without RocksDB | yes     |
//! | `RocksDbStore`       | production (`msh-runtime`)  | yes     |

use crate::errors::KVStoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Abstract interface for key-value database operations.
///
/// `atomic_batch_write` MUST apply every operation or none of them.
/// `prefix_scan` returns rows in ascending key order.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All rows whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;
}

/// Lets the runtime pick a backend at startup.
impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        (**self).delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        (**self).atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        (**self).exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        (**self).prefix_scan(prefix)
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

fn scan(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    data.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// In-memory key-value store for tests.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        apply(&mut self.data, operations);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(scan(&self.data, prefix))
    }
}

/// File-backed key-value store.
///
/// The whole map is rewritten on every mutation through a temp file and an
/// atomic rename, so a crash leaves either the old or the new snapshot.
/// Record format: `[key_len:u32 LE][key][value_len:u32 LE][value]...`.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open (or create) the store at `path`.
    ///
    /// A truncated or malformed file is a `CorruptionError`, never an empty
    /// store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => {
                let data = Self::decode(&bytes)?;
                tracing::info!(
                    "[shared-types] loaded {} keys from {}",
                    data.len(),
                    path.display()
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("[shared-types] new storage file at {}", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(io_error(e)),
        };
        Ok(Self { data, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < bytes.len() {
            let key = read_chunk(bytes, &mut cursor)?;
            let value = read_chunk(bytes, &mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn encode(data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (key, value) in data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }
        bytes
    }

    /// Persist `next` and only then make it the live map.
    fn commit(&mut self, next: BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), KVStoreError> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_error)?;
        file.write_all(&Self::encode(&next)).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_error)?;

        self.data = next;
        Ok(())
    }
}

fn io_error(e: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: e.to_string(),
    }
}

fn read_chunk(bytes: &[u8], cursor: &mut usize) -> Result<Vec<u8>, KVStoreError> {
    let corrupt = |what: &str, at: usize| KVStoreError::CorruptionError {
        message: format!("{} at offset {}", what, at),
    };
    let start = *cursor;
    let len_bytes: [u8; 4] = bytes
        .get(start..start + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| corrupt("truncated length", start))?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    *cursor = start + 4;
    let body = *cursor;
    let chunk = bytes
        .get(body..body + len)
        .ok_or_else(|| corrupt("truncated record", body))?
        .to_vec();
    *cursor += len;
    Ok(chunk)
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::put(key, value)])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut next = self.data.clone();
        apply(&mut next, operations);
        self.commit(next)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(scan(&self.data, prefix))
    }
}
