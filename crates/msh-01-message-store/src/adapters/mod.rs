//! # Adapters Layer
//!
//! - `codec`: bincode encoding of stored records
//! - `lock`: exclusive process lock on the data directory

pub mod codec;

#[cfg(feature = "locking")]
pub mod lock;
