//! # Ports Layer
//!
//! - `inbound`: the API this subsystem offers (`SplitAndJoinApi`)
//! - `outbound`: what it requires (key-value store, clock)

pub mod inbound;
pub mod outbound;
