//! # Ports Layer
//!
//! - `inbound`: the API this subsystem offers (`MessageStoreApi`)
//! - `outbound`: what it requires from the host (key-value store, clock)

pub mod inbound;
pub mod outbound;
