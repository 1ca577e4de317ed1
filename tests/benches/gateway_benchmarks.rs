//! # MSH Gateway Benchmarks
//!
//! | Group | Path |
//! |-------|------|
//! | msh-01-message-store | save and lookup over the in-memory store |
//! | msh-03-split-and-join | MIME parsing of a source message |
//! | msh-04-retry-scheduler | the pure retry decision |
//! | msh-05-non-repudiation | envelope digest and verification |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use msh_01_message_store::{
    MessageRouting, MessageStoreApi, MessageStoreService, NewMessage, StoreConfig,
};
use msh_02_leg_configuration::{RetryPolicy, RetryStrategy};
use msh_03_split_and_join::{MimePart, SourceMessage};
use msh_04_retry_scheduler::decide;
use msh_05_non_repudiation::{EnvelopeKind, RawEnvelopeLog};
use rand::Rng;
use shared_types::{DomainContext, InMemoryKVStore, MessageId, SystemTimeSource};
use std::time::Duration;

fn routing() -> MessageRouting {
    MessageRouting {
        from_party: "blue_gw".into(),
        to_party: "red_gw".into(),
        service: "bdx:noprocess".into(),
        action: "TC1Leg1".into(),
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_message_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("msh-01-message-store");
    group.measurement_time(Duration::from_secs(5));

    let ctx = DomainContext::default_domain();
    let store = MessageStoreService::new(
        InMemoryKVStore::new(),
        SystemTimeSource,
        StoreConfig::default(),
    );
    let payload = random_bytes(4 * 1024);
    let mut next = 0u64;

    group.throughput(Throughput::Elements(1));
    group.bench_function("save_4k", |b| {
        b.iter(|| {
            next += 1;
            let id = MessageId::new(format!("bench-{}@blue", next)).unwrap();
            let new = NewMessage::outbound(id, routing());
            black_box(store.save(&ctx, new, Some(payload.clone())).unwrap())
        })
    });

    let known = MessageId::new("bench-1@blue").unwrap();
    group.bench_function("find_message", |b| {
        b.iter(|| black_box(store.find_message(&ctx, &known).unwrap()))
    });

    group.finish();
}

fn bench_mime_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("msh-03-split-and-join");

    for size in [16 * 1024, 256 * 1024, 1024 * 1024] {
        let envelope = MimePart::new("application/soap+xml", b"<env:Envelope/>".to_vec());
        let attachment = MimePart::new("application/octet-stream", random_bytes(size))
            .with_content_id("payload@blue");
        let (content_type, body) =
            SourceMessage::to_mime(&envelope, &[attachment], "msh-bench-boundary");

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", size), &body, |b, body| {
            b.iter(|| black_box(SourceMessage::parse(&content_type, body).unwrap()))
        });
    }

    group.finish();
}

fn bench_retry_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("msh-04-retry-scheduler");

    let ctx = DomainContext::default_domain();
    let store = MessageStoreService::new(
        InMemoryKVStore::new(),
        SystemTimeSource,
        StoreConfig::default(),
    );
    let mut new = NewMessage::outbound(MessageId::new("decide@blue").unwrap(), routing());
    new.send_attempts_max = 6;
    let message = store.save(&ctx, new, None).unwrap();

    for strategy in [RetryStrategy::Constant, RetryStrategy::Progressive] {
        let policy = RetryPolicy {
            retry_count: 5,
            retry_interval_ms: 1_000,
            retry_timeout_ms: 60_000,
            strategy,
        };
        group.bench_with_input(
            BenchmarkId::new("decide", format!("{:?}", strategy)),
            &policy,
            |b, policy| b.iter(|| black_box(decide(&message, policy, true, message.received))),
        );
    }

    group.finish();
}

fn bench_envelope_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("msh-05-non-repudiation");
    let id = MessageId::new("evidence@blue").unwrap();

    for size in [1024, 64 * 1024, 1024 * 1024] {
        let raw = random_bytes(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("record_and_verify", size), &raw, |b, raw| {
            b.iter(|| {
                let log = RawEnvelopeLog::new(id.clone(), EnvelopeKind::Request, raw.clone(), 0);
                black_box(log.verify())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_message_store,
    bench_mime_parse,
    bench_retry_decision,
    bench_envelope_digest
);
criterion_main!(benches);
