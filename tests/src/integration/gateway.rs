//! A complete gateway assembled from the subsystem services.

use msh_01_message_store::{Message, MessageRouting, MessageStoreApi, MessageStoreService, StoreConfig};
use msh_02_leg_configuration::{LegConfigurationApi, LegConfigurationResolver, PModeConfiguration};
use msh_03_split_and_join::{FragmentManagerService, SplitAndJoinApi, SplitAndJoinConfig};
use msh_04_retry_scheduler::{
    DispatchAdapter, RetryScheduler, SchedulerConfig, SchedulerDependencies, StoreRoutingInfo,
};
use msh_05_non_repudiation::{NonRepudiationApi, NonRepudiationConfig, NonRepudiationService};
use msh_runtime::adapters::NonRepudiationRecorder;
use shared_bus::InMemoryEventBus;
use shared_types::{
    DomainContext, DomainId, InMemoryKVStore, KeyValueStore, MessageId, MessageStatus,
    SystemTimeSource,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const PMODE: &str = r#"{
    "parties": [
        {"name": "blue_gw", "endpoint": "http://blue.example/msh"},
        {"name": "red_gw", "endpoint": "http://red.example/msh"}
    ],
    "legs": [
        {
            "name": "pushTest",
            "service": "bdx:noprocess",
            "action": "TC1Leg1",
            "reception_awareness": {"retry_count": 2, "retry_interval_ms": 100, "strategy": "CONSTANT"}
        },
        {
            "name": "pushLarge",
            "service": "bdx:noprocess",
            "action": "LargeDoc",
            "splitting": {"fragment_size": 512, "compression": true, "join_interval_ms": 60000}
        }
    ],
    "processes": [
        {
            "name": "tc1Process",
            "initiator_parties": ["blue_gw"],
            "responder_parties": ["red_gw"],
            "legs": ["pushTest", "pushLarge"]
        }
    ]
}"#;

pub struct TestGateway {
    pub scheduler: RetryScheduler,
    pub store: Arc<dyn MessageStoreApi>,
    pub legs: Arc<dyn LegConfigurationApi>,
    pub fragments: Arc<dyn SplitAndJoinApi>,
    pub non_repudiation: Arc<dyn NonRepudiationApi>,
    pub bus: Arc<InMemoryEventBus>,
}

pub struct GatewayOptions {
    /// Domains with a PMode installed.
    pub domains: Vec<&'static str>,
    pub non_repudiation: NonRepudiationConfig,
    pub attempt_audit: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            domains: vec!["default"],
            non_repudiation: NonRepudiationConfig::for_testing(),
            attempt_audit: true,
        }
    }
}

/// Gateway over in-memory stores, with its files under `dir`.
pub fn gateway(dir: &Path, dispatcher: Arc<dyn DispatchAdapter>, options: GatewayOptions) -> TestGateway {
    gateway_over(dir, Box::new(InMemoryKVStore::new()), dispatcher, options)
}

/// Gateway whose messages live in `messages`.
pub fn gateway_over(
    dir: &Path,
    messages: Box<dyn KeyValueStore>,
    dispatcher: Arc<dyn DispatchAdapter>,
    options: GatewayOptions,
) -> TestGateway {
    let store: Arc<dyn MessageStoreApi> = Arc::new(MessageStoreService::new(
        messages,
        SystemTimeSource,
        StoreConfig::for_testing(),
    ));
    let legs = LegConfigurationResolver::new(StoreRoutingInfo::new(Arc::clone(&store)));
    for domain in &options.domains {
        legs.load_domain(
            DomainId::new(*domain).unwrap(),
            PModeConfiguration::from_json(PMODE).unwrap(),
        )
        .unwrap();
    }
    let legs: Arc<dyn LegConfigurationApi> = Arc::new(legs);
    let fragments: Arc<dyn SplitAndJoinApi> = Arc::new(FragmentManagerService::new(
        InMemoryKVStore::new(),
        SystemTimeSource,
        SplitAndJoinConfig::under(dir.join("split-and-join")),
    ));
    let non_repudiation: Arc<dyn NonRepudiationApi> = Arc::new(NonRepudiationService::new(
        InMemoryKVStore::new(),
        SystemTimeSource,
        options.non_repudiation,
    ));
    let bus = Arc::new(InMemoryEventBus::new());

    let mut config = SchedulerConfig::for_testing(dir.join("outbox"));
    config.attempt_audit_active = options.attempt_audit;

    let scheduler = RetryScheduler::new(SchedulerDependencies {
        store: Arc::clone(&store),
        legs: Arc::clone(&legs),
        fragments: Arc::clone(&fragments),
        dispatcher,
        events: bus.clone(),
        recorder: Arc::new(NonRepudiationRecorder::new(Arc::clone(&non_repudiation))),
        time_source: Arc::new(SystemTimeSource),
        config,
    });

    TestGateway {
        scheduler,
        store,
        legs,
        fragments,
        non_repudiation,
        bus,
    }
}

pub fn domain(name: &str) -> DomainContext {
    DomainContext::new(DomainId::new(name).unwrap())
}

pub fn id(raw: &str) -> MessageId {
    MessageId::new(raw).unwrap()
}

pub fn routing(action: &str) -> MessageRouting {
    MessageRouting {
        from_party: "blue_gw".into(),
        to_party: "red_gw".into(),
        service: "bdx:noprocess".into(),
        action: action.into(),
    }
}

impl TestGateway {
    /// Poll the store until `id` reaches `status`.
    pub async fn wait_for_status(
        &self,
        ctx: &DomainContext,
        id: &MessageId,
        status: MessageStatus,
    ) -> Message {
        for _ in 0..500 {
            if let Some(message) = self.store.find_message(ctx, id).unwrap() {
                if message.status == status {
                    return message;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let current = self.store.find_message(ctx, id).unwrap();
        panic!("{} never reached {}: {:?}", id, status, current.map(|m| m.status));
    }
}
