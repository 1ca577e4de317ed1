//! # Ports Layer
//!
//! - `inbound`: recording and retention API used by the transport layer
//! - `outbound`: persistence and clock

pub mod inbound;
pub mod outbound;
