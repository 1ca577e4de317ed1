//! # Non-Repudiation Recorder (msh-05)
//!
//! Keeps the raw envelopes exchanged for each user message, byte for byte,
//! as evidence of what was sent and received.
//!
//! - Request envelopes are filed under the user message id, responses under
//!   the id of the user message they answer.
//! - Recording is best effort: failures are logged at `warn` and dropped.
//! - With audit off nothing is read or written.
//! - Each record carries its length and CRC32; reads reject altered records.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::config::NonRepudiationConfig;
pub use domain::entities::{EnvelopeKind, RawEnvelopeLog, SignalMessageRef, UserMessageRef};
pub use domain::errors::NonRepudiationError;
pub use ports::inbound::NonRepudiationApi;
pub use service::NonRepudiationService;
