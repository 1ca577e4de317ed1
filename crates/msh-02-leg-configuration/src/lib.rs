//! # Leg Configuration Resolver (msh-02)
//!
//! Turns a message's party/service/action quadruple into the concrete
//! exchange rules ("leg") negotiated in the domain's PMode: retry policy,
//! reliability, compression and split-and-join eligibility.
//!
//! ## Snapshots
//!
//! ```text
//! PMode JSON ──parse──→ PModeConfiguration ──validate+index──→ PModeSnapshot
//!                                                                  │
//!                     load_domain() swaps the Arc per domain ──────┘
//!
//! resolve(ctx, message_id):
//!   pinned?  ──yes──→ same Arc<LegConfiguration> as last time
//!      │no
//!      └──→ RoutingInfoSource (party/service/action, leg name)
//!              └──→ current snapshot ──→ pin ──→ Arc<LegConfiguration>
//! ```
//!
//! A resolved leg stays pinned to its message until `invalidate` is called
//! (restore, resubmission, terminal state), so a PMode reload never changes
//! the rules of a delivery already under way.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::errors::LegConfigurationError;
pub use domain::leg::{
    LegConfiguration, Reliability, ReplyPattern, RetryPolicy, RetryStrategy, Splitting,
};
pub use domain::pmode::{PModeConfiguration, PartyDefinition, ProcessDefinition};
pub use domain::snapshot::{PModeSnapshot, RoutingKey};
pub use ports::inbound::LegConfigurationApi;
pub use ports::outbound::{RoutingInfo, RoutingInfoSource};
pub use service::LegConfigurationResolver;
