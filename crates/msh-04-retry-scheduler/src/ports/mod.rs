//! # Ports Layer
//!
//! - `inbound`: the delivery API offered to backends and administrators
//! - `outbound`: dispatch transport and envelope recording, provided by the host

pub mod inbound;
pub mod outbound;
