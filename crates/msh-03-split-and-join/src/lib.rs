//! # Split-and-Join (msh-03)
//!
//! Cuts source messages that are too large for one transfer into ordered
//! fragments and puts received fragments back together.
//!
//! ## Sending side
//!
//! ```text
//! source file ──[zstd]──→ cut(fragment_size) ──→ <group>_<n>.fragment
//!                                                      │
//!               MessageGroup + MessageFragmentEntity ←─┘ (one batch)
//! ```
//!
//! ## Receiving side
//!
//! ```text
//! fragment ──→ register_inbound_fragment ──complete?──→ rejoin_message_fragments
//!                                                             │
//!                              rejoin_source_message ←────────┘
//!                              (zstd decode, multipart/related parse)
//! ```
//!
//! ## Rules
//!
//! - Fragment numbers are 0-based and contiguous; a number is registered once.
//! - A group declaring zero fragments is rejected.
//! - Fragment records of one call are written together or not at all.
//! - Rejoin checks completeness and every digest before the output file
//!   appears, and returns the same file when called again.
//! - Rejoined groups keep their fragments until `purge_group`.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::config::SplitAndJoinConfig;
pub use domain::entities::{
    FragmentRegistration, GroupState, MessageFragmentEntity, MessageGroup, SplitOutcome,
};
pub use domain::errors::SplitAndJoinError;
pub use domain::mime::{MimePart, SourceMessage};
pub use ports::inbound::SplitAndJoinApi;
pub use service::FragmentManagerService;
