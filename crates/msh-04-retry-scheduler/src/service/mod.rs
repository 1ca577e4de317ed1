//! # Retry Scheduler Service
//!
//! Drives every outbound message through the dispatch adapter until it is
//! delivered, runs out of attempts, or fails for good.
//!
//! ## Timers
//!
//! A queued attempt is a tokio task sleeping until the message's
//! `next_attempt`. The durable `next_attempt` is the source of truth: a
//! timer that fires early finds the message not yet due and re-arms, and
//! `recover_pending` re-arms everything after a restart.
//!
//! ## Single flight
//!
//! The store's `begin_attempt` compare-and-set into `SendInProgress` is the
//! only gate. Two timers for the same message race on it and one loses
//! quietly. Completion is a second compare-and-set, so an attempt whose
//! message was deleted meanwhile is discarded.

mod admin;
mod api;
mod attempts;
mod dispatch;
mod inbound;
mod notify;
mod recovery;
mod submit;

pub use attempts::MessageAttemptService;
pub use recovery::{MaintenanceReport, RecoveryReport};

use crate::domain::config::SchedulerConfig;
use crate::ports::outbound::{DispatchAdapter, EnvelopeRecorder, EventPublisher, TimeSource};
use msh_01_message_store::MessageStoreApi;
use msh_02_leg_configuration::LegConfigurationApi;
use msh_03_split_and_join::SplitAndJoinApi;
use shared_types::{DomainContext, MessageId, Timestamp};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Everything the scheduler talks to.
pub struct SchedulerDependencies {
    pub store: Arc<dyn MessageStoreApi>,
    pub legs: Arc<dyn LegConfigurationApi>,
    pub fragments: Arc<dyn SplitAndJoinApi>,
    pub dispatcher: Arc<dyn DispatchAdapter>,
    pub events: Arc<dyn EventPublisher>,
    pub recorder: Arc<dyn EnvelopeRecorder>,
    pub time_source: Arc<dyn TimeSource>,
    pub config: SchedulerConfig,
}

struct Inner {
    store: Arc<dyn MessageStoreApi>,
    legs: Arc<dyn LegConfigurationApi>,
    fragments: Arc<dyn SplitAndJoinApi>,
    dispatcher: Arc<dyn DispatchAdapter>,
    events: Arc<dyn EventPublisher>,
    recorder: Arc<dyn EnvelopeRecorder>,
    time_source: Arc<dyn TimeSource>,
    attempts: MessageAttemptService,
    config: SchedulerConfig,
    permits: Semaphore,
    in_flight: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
}

/// Cloneable handle; clones share timers and state.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<Inner>,
}

/// Counts a dispatch for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RetryScheduler {
    pub fn new(deps: SchedulerDependencies) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let attempts =
            MessageAttemptService::new(Arc::clone(&deps.store), deps.config.attempt_audit_active);
        let permits = Semaphore::new(deps.config.max_concurrent_dispatches.max(1));

        Self {
            inner: Arc::new(Inner {
                store: deps.store,
                legs: deps.legs,
                fragments: deps.fragments,
                dispatcher: deps.dispatcher,
                events: deps.events,
                recorder: deps.recorder,
                time_source: deps.time_source,
                attempts,
                config: deps.config,
                permits,
                in_flight: AtomicUsize::new(0),
                shutdown_tx,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn attempt_service(&self) -> &MessageAttemptService {
        &self.inner.attempts
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Attempts currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn now(&self) -> Timestamp {
        self.inner.time_source.now()
    }

    /// Queue an attempt for `at`.
    pub(crate) fn arm(&self, ctx: &DomainContext, id: &MessageId, at: Timestamp, lookup_retries: u32) {
        if self.is_shutting_down() {
            return;
        }
        let delay = Duration::from_millis(at.saturating_sub(self.now()));
        let scheduler = self.clone();
        let ctx = ctx.clone();
        let id = id.clone();
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        debug!(
            domain = %ctx.domain(),
            message_id = %id,
            delay_ms = delay.as_millis() as u64,
            "[msh-04] Attempt queued"
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
            if let Err(e) = scheduler.run_attempt(&ctx, &id, lookup_retries).await {
                match e {
                    crate::domain::errors::SchedulerError::ShuttingDown => {
                        debug!(message_id = %id, "[msh-04] Attempt dropped at shutdown")
                    }
                    e => error!(
                        domain = %ctx.domain(),
                        message_id = %id,
                        error = %e,
                        "[msh-04] Attempt failed to run"
                    ),
                }
            }
        });
    }

    /// Stop queuing, cancel sleeping timers and wait for in-flight attempts.
    ///
    /// An attempt still running after the grace period stays
    /// `SendInProgress` and is reset by `recover_pending` on the next start.
    pub async fn shutdown(&self) {
        info!("[msh-04] Shutting down scheduler");
        self.inner.shutdown_tx.send_replace(true);
        self.inner.permits.close();

        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_grace;
        while self.in_flight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        match self.in_flight() {
            0 => info!("[msh-04] Scheduler stopped"),
            n => warn!(in_flight = n, "[msh-04] Scheduler stopped with attempts in flight"),
        }
    }
}
