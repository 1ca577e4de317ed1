//! Non-repudiation recorder tests.

use super::*;
use crate::domain::entities::{EnvelopeKind, SignalMessageRef, UserMessageRef};
use crate::ports::inbound::NonRepudiationApi;
use shared_types::{
    BatchOperation, DomainId, InMemoryKVStore, KVStoreError, MockTimeSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts every call that reaches the store.
#[derive(Default)]
struct CountingKV {
    inner: InMemoryKVStore,
    calls: Arc<AtomicUsize>,
}

impl KeyValueStore for CountingKV {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.atomic_batch_write(operations)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.prefix_scan(prefix)
    }
}

/// Every write fails.
struct BrokenKV;

impl KeyValueStore for BrokenKV {
    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(None)
    }

    fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KVStoreError> {
        Err(KVStoreError::IOError {
            message: "disk full".into(),
        })
    }

    fn delete(&mut self, _key: &[u8]) -> Result<(), KVStoreError> {
        Ok(())
    }

    fn atomic_batch_write(&mut self, _operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        Err(KVStoreError::IOError {
            message: "disk full".into(),
        })
    }

    fn prefix_scan(&self, _prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(Vec::new())
    }
}

fn make_recorder() -> NonRepudiationService<InMemoryKVStore, Arc<MockTimeSource>> {
    NonRepudiationService::new(
        InMemoryKVStore::new(),
        Arc::new(MockTimeSource::new(5_000)),
        NonRepudiationConfig::for_testing(),
    )
}

fn ctx() -> DomainContext {
    DomainContext::default_domain()
}

fn id(s: &str) -> MessageId {
    MessageId::new(s).unwrap()
}

#[test]
fn test_request_and_response_recorded_in_order() {
    let recorder = make_recorder();
    let user = UserMessageRef::new(id("m1@blue"));

    recorder.save_request(&ctx(), b"<env:Envelope>user</env:Envelope>", &user);
    recorder.save_response(
        &ctx(),
        b"<env:Envelope>receipt</env:Envelope>",
        &SignalMessageRef::answering(id("m1@blue")).with_signal_id(id("sig-1@red")),
    );

    let envelopes = recorder.get_envelopes(&ctx(), &id("m1@blue")).unwrap();
    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].kind, EnvelopeKind::Request);
    assert_eq!(envelopes[0].raw, b"<env:Envelope>user</env:Envelope>".to_vec());
    assert_eq!(envelopes[0].created, 5_000);
    assert_eq!(envelopes[1].kind, EnvelopeKind::Response);
    assert_eq!(envelopes[1].signal_message_id, Some(id("sig-1@red")));
    assert!(recorder.has_envelopes(&ctx(), &id("m1@blue")).unwrap());
}

#[test]
fn test_repeated_requests_all_kept() {
    let recorder = make_recorder();
    let user = UserMessageRef::new(id("m1@blue"));

    for attempt in 0..3u8 {
        recorder.save_request(&ctx(), &[attempt], &user);
    }
    let raws: Vec<Vec<u8>> = recorder
        .get_envelopes(&ctx(), &id("m1@blue"))
        .unwrap()
        .into_iter()
        .map(|e| e.raw)
        .collect();
    assert_eq!(raws, vec![vec![0], vec![1], vec![2]]);
}

#[test]
fn test_disabled_audit_touches_nothing() {
    let kv = CountingKV::default();
    let calls = Arc::clone(&kv.calls);
    let recorder = NonRepudiationService::new(
        kv,
        MockTimeSource::new(0),
        NonRepudiationConfig::disabled(),
    );

    recorder.save_request(&ctx(), b"wire", &UserMessageRef::new(id("m1@blue")));
    recorder.save_response(&ctx(), b"wire", &SignalMessageRef::answering(id("m1@blue")));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_store_failure_is_swallowed() {
    let recorder = NonRepudiationService::new(
        BrokenKV,
        MockTimeSource::new(0),
        NonRepudiationConfig::for_testing(),
    );

    recorder.save_request(&ctx(), b"wire", &UserMessageRef::new(id("m1@blue")));
    recorder.save_response(&ctx(), b"wire", &SignalMessageRef::answering(id("m1@blue")));

    assert!(recorder.get_envelopes(&ctx(), &id("m1@blue")).unwrap().is_empty());
}

#[test]
fn test_oversized_envelope_skipped() {
    let recorder = make_recorder();

    recorder.save_request(&ctx(), &vec![b'x'; 2_048], &UserMessageRef::new(id("m1@blue")));

    assert!(!recorder.has_envelopes(&ctx(), &id("m1@blue")).unwrap());
}

#[test]
fn test_tampered_envelope_detected() {
    let recorder = make_recorder();
    recorder.save_request(&ctx(), b"original", &UserMessageRef::new(id("m1@blue")));

    {
        let mut kv = recorder.kv_store.lock();
        let (key, bytes) = kv
            .prefix_scan(&keys::envelope_prefix(&ctx(), &id("m1@blue")))
            .unwrap()
            .remove(0);
        let mut log: RawEnvelopeLog = bincode::deserialize(&bytes).unwrap();
        log.raw = b"0riginal".to_vec();
        kv.put(&key, &bincode::serialize(&log).unwrap()).unwrap();
    }

    assert!(matches!(
        recorder.get_envelopes(&ctx(), &id("m1@blue")),
        Err(NonRepudiationError::DigestMismatch { index: 0, .. })
    ));
}

#[test]
fn test_delete_envelopes() {
    let recorder = make_recorder();
    let user = UserMessageRef::new(id("m1@blue"));
    recorder.save_request(&ctx(), b"a", &user);
    recorder.save_response(&ctx(), b"b", &SignalMessageRef::answering(id("m1@blue")));
    recorder.save_request(&ctx(), b"c", &UserMessageRef::new(id("m10@blue")));

    assert_eq!(recorder.delete_envelopes(&ctx(), &id("m1@blue")).unwrap(), 2);
    assert_eq!(recorder.delete_envelopes(&ctx(), &id("m1@blue")).unwrap(), 0);
    assert!(!recorder.has_envelopes(&ctx(), &id("m1@blue")).unwrap());
    assert!(recorder.has_envelopes(&ctx(), &id("m10@blue")).unwrap());
}

#[test]
fn test_domains_isolated() {
    let recorder = make_recorder();
    let red = DomainContext::new(DomainId::new("red").unwrap());

    recorder.save_request(&ctx(), b"blue wire", &UserMessageRef::new(id("m1@blue")));

    assert!(recorder.get_envelopes(&red, &id("m1@blue")).unwrap().is_empty());
    assert_eq!(recorder.delete_envelopes(&red, &id("m1@blue")).unwrap(), 0);
    assert!(recorder.has_envelopes(&ctx(), &id("m1@blue")).unwrap());
}
