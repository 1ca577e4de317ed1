//! # Shared Types Crate
//!
//! This crate contains the types every MSH subsystem agrees on: message
//! identity, the message lifecycle, the tenant ("domain") context and the
//! key-value persistence port.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Explicit Tenancy**: Every store/scheduler operation takes a
//!   [`DomainContext`]; nothing reads an ambient "current domain".
//! - **Port, not engine**: [`storage::KeyValueStore`] is the only persistence
//!   contract. Concrete engines live behind it.

pub mod entities;
pub mod errors;
pub mod storage;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use storage::{BatchOperation, FileBackedKVStore, InMemoryKVStore, KeyValueStore};
pub use time::{MockTimeSource, SystemTimeSource, TimeSource};
