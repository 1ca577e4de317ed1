//! # Retry Scheduler (msh-04)
//!
//! Owns the send lifecycle of every outbound message: submission, timed
//! attempts through the [`DispatchAdapter`], retries under the leg's
//! reception-awareness policy, final failure, restore and delete. Also
//! receives inbound fragments and triggers their rejoin.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──→ SEND_ENQUEUED ──timer──→ SEND_IN_PROGRESS ──→ dispatch
//!                 ▲                                           │
//!                 │              ┌──── delivered ─────────────┤──→ SEND_SUCCESS
//!   restore ──────┤              │                            │
//!                 │      WAITING_FOR_RETRY ←── retryable, ────┤
//!                 │              │            attempts left   │
//!                 └── SEND_FAILURE ←──── exhausted / fatal ───┘
//! ```
//!
//! ## Rules
//!
//! - At most one attempt per message is in flight; the store's
//!   compare-and-set into `SEND_IN_PROGRESS` decides.
//! - `send_attempts` never exceeds `send_attempts_max`.
//! - Split source messages are never dispatched; their state follows the
//!   fragment group.
//! - Backend notifications fire only while the message's notification
//!   status is `REQUIRED`. It becomes `NOTIFIED` once a subscriber took the
//!   event; until then recovery sends it again.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::routing_info::StoreRoutingInfo;
pub use domain::config::SchedulerConfig;
pub use domain::dispatch::{
    DispatchFailure, DispatchOutcome, FailureKind, FragmentInfo, OutboundMessage,
};
pub use domain::errors::SchedulerError;
pub use domain::retry::{decide, GiveUpReason, RetryDecision};
pub use domain::submission::{
    AttemptReport, FragmentAcceptance, InboundFragment, RejoinOutcome, Submission,
};
pub use ports::inbound::DeliveryApi;
pub use ports::outbound::{DispatchAdapter, EnvelopeRecorder, NoEnvelopeRecorder};
pub use service::{
    MaintenanceReport, MessageAttemptService, RecoveryReport, RetryScheduler,
    SchedulerDependencies,
};

#[cfg(any(test, feature = "test-utils"))]
pub use adapters::scripted::{DispatchCall, ScriptedDispatchAdapter};
