//! # Outbound Ports (Driven Ports)

use crate::domain::dispatch::{DispatchOutcome, OutboundMessage};
use async_trait::async_trait;
use msh_02_leg_configuration::LegConfiguration;
use shared_types::{DomainContext, MessageId};
use std::time::Duration;

pub use shared_bus::EventPublisher;
pub use shared_types::TimeSource;

/// Transport that puts one message on the wire.
///
/// Implementations report every failure as a [`DispatchOutcome::Failed`]
/// and should honour `timeout`; the scheduler enforces it regardless.
#[async_trait]
pub trait DispatchAdapter: Send + Sync {
    async fn send(
        &self,
        ctx: &DomainContext,
        message: &OutboundMessage,
        leg: &LegConfiguration,
        timeout: Duration,
    ) -> DispatchOutcome;
}

/// Best-effort recording of raw wire envelopes.
///
/// Never fails from the caller's point of view.
pub trait EnvelopeRecorder: Send + Sync {
    fn record_request(&self, ctx: &DomainContext, message_id: &MessageId, wire: &[u8]);

    fn record_response(&self, ctx: &DomainContext, message_id: &MessageId, wire: &[u8]);
}

/// Recorder that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnvelopeRecorder;

impl EnvelopeRecorder for NoEnvelopeRecorder {
    fn record_request(&self, _ctx: &DomainContext, _message_id: &MessageId, _wire: &[u8]) {}

    fn record_response(&self, _ctx: &DomainContext, _message_id: &MessageId, _wire: &[u8]) {}
}
