//! Programmable dispatch adapter.
//!
//! Plays queued outcomes in order, then falls back to a default. Every call
//! is recorded with the wall-clock time it arrived.

use crate::domain::dispatch::{DispatchOutcome, OutboundMessage};
use crate::ports::outbound::DispatchAdapter;
use async_trait::async_trait;
use msh_02_leg_configuration::LegConfiguration;
use parking_lot::Mutex;
use shared_types::{DomainContext, MessageId, SystemTimeSource, TimeSource, Timestamp};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCall {
    pub message_id: MessageId,
    pub at: Timestamp,
    pub payload: Vec<u8>,
    pub endpoint: Option<String>,
    pub fragment_number: Option<u32>,
}

pub struct ScriptedDispatchAdapter {
    script: Mutex<VecDeque<DispatchOutcome>>,
    fallback: DispatchOutcome,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<DispatchCall>>,
}

impl ScriptedDispatchAdapter {
    /// Every call succeeds unless scripted otherwise.
    pub fn delivering() -> Self {
        Self::with_fallback(DispatchOutcome::delivered())
    }

    pub fn with_fallback(fallback: DispatchOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next unscripted call.
    pub fn push(&self, outcome: DispatchOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Hold every call for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, id: &MessageId) -> Vec<DispatchCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| &c.message_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DispatchAdapter for ScriptedDispatchAdapter {
    async fn send(
        &self,
        _ctx: &DomainContext,
        message: &OutboundMessage,
        _leg: &LegConfiguration,
        _timeout: Duration,
    ) -> DispatchOutcome {
        self.calls.lock().push(DispatchCall {
            message_id: message.message_id.clone(),
            at: SystemTimeSource.now(),
            payload: message.payload.clone(),
            endpoint: message.endpoint.clone(),
            fragment_number: message.fragment.as_ref().map(|f| f.fragment_number),
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
