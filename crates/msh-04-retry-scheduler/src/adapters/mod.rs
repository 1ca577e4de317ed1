//! # Adapters
//!
//! - `routing_info`: the leg resolver's routing lookup, served by the store
//! - `scripted`: a programmable dispatch adapter for tests

pub mod routing_info;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
