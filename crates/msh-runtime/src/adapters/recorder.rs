//! Envelope recording for the scheduler, backed by the non-repudiation
//! recorder.

use msh_04_retry_scheduler::EnvelopeRecorder;
use msh_05_non_repudiation::{NonRepudiationApi, SignalMessageRef, UserMessageRef};
use shared_types::{DomainContext, MessageId};
use std::sync::Arc;

pub struct NonRepudiationRecorder {
    inner: Arc<dyn NonRepudiationApi>,
}

impl NonRepudiationRecorder {
    pub fn new(inner: Arc<dyn NonRepudiationApi>) -> Self {
        Self { inner }
    }
}

impl EnvelopeRecorder for NonRepudiationRecorder {
    fn record_request(&self, ctx: &DomainContext, message_id: &MessageId, wire: &[u8]) {
        self.inner
            .save_request(ctx, wire, &UserMessageRef::new(message_id.clone()));
    }

    fn record_response(&self, ctx: &DomainContext, message_id: &MessageId, wire: &[u8]) {
        self.inner
            .save_response(ctx, wire, &SignalMessageRef::answering(message_id.clone()));
    }
}
