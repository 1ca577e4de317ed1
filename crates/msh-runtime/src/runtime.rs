//! # Gateway Runtime
//!
//! Wires the subsystems together and owns the background tasks.
//!
//! ## Startup sequence
//!
//! 1. Validate configuration, check free disk space
//! 2. Lock the data directory (persistent backends only)
//! 3. Open storage and build the subsystems
//! 4. Install each domain's PMode
//! 5. Start the notification logger
//! 6. Recover messages left pending by the previous run
//! 7. Start the maintenance tick

use crate::adapters::{
    available_disk_space_percent, open_stores, spawn_notification_logger, HttpDispatchAdapter,
    NonRepudiationRecorder,
};
use crate::config::{GatewayConfig, StorageBackend};
use anyhow::{bail, Context, Result};
use msh_01_message_store::{DatabaseLock, MessageStoreApi, MessageStoreService};
use msh_02_leg_configuration::{LegConfigurationApi, LegConfigurationResolver, PModeConfiguration};
use msh_03_split_and_join::{FragmentManagerService, SplitAndJoinApi};
use msh_04_retry_scheduler::{RetryScheduler, SchedulerDependencies, StoreRoutingInfo};
use msh_05_non_repudiation::{NonRepudiationApi, NonRepudiationService};
use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use shared_types::{DomainContext, SystemTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long `shutdown` waits for each background task.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GatewayRuntime {
    config: GatewayConfig,
    contexts: Vec<DomainContext>,
    store: Arc<dyn MessageStoreApi>,
    legs: Arc<dyn LegConfigurationApi>,
    fragments: Arc<dyn SplitAndJoinApi>,
    non_repudiation: Arc<dyn NonRepudiationApi>,
    bus: Arc<InMemoryEventBus>,
    scheduler: RetryScheduler,
    shutdown_tx: watch::Sender<bool>,
    notifier: Mutex<Option<JoinHandle<u64>>>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    /// Held for the life of the runtime.
    _lock: Option<DatabaseLock>,
}

impl GatewayRuntime {
    pub async fn start(config: GatewayConfig) -> Result<Self> {
        info!("===========================================");
        info!("  MSH Gateway Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        config.validate().context("Invalid configuration")?;
        let persistent = config.storage_backend != StorageBackend::Memory;

        let lock = if persistent {
            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("Failed to create data directory {}", config.data_dir.display())
            })?;
            check_disk_space(&config)?;
            Some(DatabaseLock::acquire(&config.data_dir).context("Failed to lock data directory")?)
        } else {
            None
        };

        let stores = open_stores(&config).context("Failed to open storage")?;
        let time_source = Arc::new(SystemTimeSource);

        let store: Arc<dyn MessageStoreApi> = Arc::new(MessageStoreService::new(
            stores.messages,
            Arc::clone(&time_source),
            config.store.clone(),
        ));
        let legs: Arc<dyn LegConfigurationApi> = Arc::new(LegConfigurationResolver::new(
            StoreRoutingInfo::new(Arc::clone(&store)),
        ));
        let fragments: Arc<dyn SplitAndJoinApi> = Arc::new(FragmentManagerService::new(
            stores.fragments,
            Arc::clone(&time_source),
            config.split_and_join(),
        ));
        let non_repudiation: Arc<dyn NonRepudiationApi> = Arc::new(NonRepudiationService::new(
            stores.envelopes,
            Arc::clone(&time_source),
            config.non_repudiation.clone(),
        ));
        let bus = Arc::new(InMemoryEventBus::new());

        let contexts: Vec<DomainContext> = config
            .domains
            .iter()
            .cloned()
            .map(DomainContext::new)
            .collect();
        for ctx in &contexts {
            load_pmode(&config, legs.as_ref(), ctx)?;
        }

        let dispatcher = HttpDispatchAdapter::new(config.dispatch_timeout)
            .context("Failed to build HTTP client")?;
        let scheduler = RetryScheduler::new(SchedulerDependencies {
            store: Arc::clone(&store),
            legs: Arc::clone(&legs),
            fragments: Arc::clone(&fragments),
            dispatcher: Arc::new(dispatcher),
            events: bus.clone(),
            recorder: Arc::new(NonRepudiationRecorder::new(Arc::clone(&non_repudiation))),
            time_source: time_source as Arc<dyn TimeSource>,
            config: config.scheduler.clone(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = spawn_notification_logger(&bus, shutdown_rx.clone());

        for ctx in &contexts {
            let report = scheduler
                .recover_pending(ctx)
                .await
                .with_context(|| format!("Recovery failed for domain {}", ctx.domain()))?;
            info!(
                domain = %ctx.domain(),
                interrupted = report.interrupted,
                failed = report.failed,
                rearmed = report.rearmed,
                rejoined = report.rejoined,
                renotified = report.renotified,
                "[msh-runtime] Pending messages recovered"
            );
        }

        let maintenance = spawn_maintenance(
            scheduler.clone(),
            contexts.clone(),
            config.maintenance_interval,
            shutdown_rx,
        );

        info!(
            domains = contexts.len(),
            backend = ?config.storage_backend,
            data_dir = %config.data_dir.display(),
            "[msh-runtime] Gateway running"
        );

        Ok(Self {
            config,
            contexts,
            store,
            legs,
            fragments,
            non_repudiation,
            bus,
            scheduler,
            shutdown_tx,
            notifier: Mutex::new(Some(notifier)),
            maintenance: Mutex::new(Some(maintenance)),
            _lock: lock,
        })
    }

    /// Stop the background tasks, then let in-flight attempts finish.
    pub async fn shutdown(&self) {
        info!("[msh-runtime] Initiating graceful shutdown");
        self.shutdown_tx.send_replace(true);

        self.scheduler.shutdown().await;

        let maintenance = self.maintenance.lock().take();
        if let Some(handle) = maintenance {
            if tokio::time::timeout(TASK_STOP_TIMEOUT, handle).await.is_err() {
                warn!("[msh-runtime] Maintenance task did not stop in time");
            }
        }
        let notifier = self.notifier.lock().take();
        if let Some(handle) = notifier {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, handle).await {
                Ok(Ok(logged)) => info!(logged, "[msh-runtime] Notifications drained"),
                Ok(Err(e)) => error!(error = %e, "[msh-runtime] Notification logger panicked"),
                Err(_) => warn!("[msh-runtime] Notification logger did not stop in time"),
            }
        }

        info!("[msh-runtime] Shutdown complete");
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn contexts(&self) -> &[DomainContext] {
        &self.contexts
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> Arc<dyn MessageStoreApi> {
        Arc::clone(&self.store)
    }

    pub fn legs(&self) -> Arc<dyn LegConfigurationApi> {
        Arc::clone(&self.legs)
    }

    pub fn fragments(&self) -> Arc<dyn SplitAndJoinApi> {
        Arc::clone(&self.fragments)
    }

    pub fn non_repudiation(&self) -> Arc<dyn NonRepudiationApi> {
        Arc::clone(&self.non_repudiation)
    }

    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }
}

fn check_disk_space(config: &GatewayConfig) -> Result<()> {
    let free = available_disk_space_percent(&config.data_dir)
        .with_context(|| format!("Failed to stat {}", config.data_dir.display()))?;
    if free < config.min_disk_space_percent {
        bail!(
            "Only {}% disk space free under {}, need {}%",
            free,
            config.data_dir.display(),
            config.min_disk_space_percent
        );
    }
    Ok(())
}

/// A domain without a PMode file starts with no legs and rejects every
/// submission until one is loaded.
fn load_pmode(
    config: &GatewayConfig,
    legs: &dyn LegConfigurationApi,
    ctx: &DomainContext,
) -> Result<()> {
    let path = config.pmode_file(ctx.domain());
    if !path.exists() {
        warn!(
            domain = %ctx.domain(),
            path = %path.display(),
            "[msh-runtime] No PMode file, domain has no legs"
        );
        return Ok(());
    }

    let pmode = PModeConfiguration::from_file(&path)
        .with_context(|| format!("Failed to read PMode {}", path.display()))?;
    let leg_count = pmode.legs.len();
    legs.load_domain(ctx.domain().clone(), pmode)
        .with_context(|| format!("Rejected PMode {}", path.display()))?;
    info!(
        domain = %ctx.domain(),
        legs = leg_count,
        "[msh-runtime] PMode loaded"
    );
    Ok(())
}

fn spawn_maintenance(
    scheduler: RetryScheduler,
    contexts: Vec<DomainContext>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; recovery just ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for ctx in &contexts {
                        match scheduler.run_maintenance(ctx).await {
                            Ok(report) => {
                                if !report.expired_groups.is_empty()
                                    || !report.expired_messages.is_empty()
                                    || !report.rejoined.is_empty()
                                {
                                    info!(
                                        domain = %ctx.domain(),
                                        rejoined = report.rejoined.len(),
                                        expired_groups = report.expired_groups.len(),
                                        expired_messages = report.expired_messages.len(),
                                        "[msh-runtime] Maintenance pass"
                                    );
                                }
                            }
                            Err(e) => error!(
                                domain = %ctx.domain(),
                                error = %e,
                                "[msh-runtime] Maintenance pass failed"
                            ),
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[msh-runtime] Maintenance stopped");
    })
}
