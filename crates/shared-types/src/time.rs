//! Time source abstraction.
//!
//! Abstracted to allow testing with deterministic time.

use crate::entities::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of wall-clock timestamps in milliseconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: AtomicU64,
}

impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        // Should be a reasonable timestamp (after year 2020)
        assert!(SystemTimeSource.now() > 1_577_836_800_000);
    }

    #[test]
    fn test_mock_time_source() {
        let source = MockTimeSource::new(1000);
        assert_eq!(source.now(), 1000);

        source.advance(500);
        assert_eq!(source.now(), 1500);

        source.set(3000);
        assert_eq!(source.now(), 3000);
    }
}
