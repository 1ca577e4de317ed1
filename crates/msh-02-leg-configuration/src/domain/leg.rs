//! # Leg Configuration
//!
//! Per-exchange delivery policy. Immutable once resolved for a message.

use serde::{Deserialize, Serialize};
use shared_types::Timestamp;
use std::time::Duration;

/// Cap on the progressive back-off interval.
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(3600);

/// How the next attempt is spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStrategy {
    /// Exactly one attempt, no retries.
    SendOnce,
    /// Fixed interval between attempts.
    #[default]
    Constant,
    /// Interval doubles after every failed attempt, capped at one hour.
    Progressive,
}

/// Reception awareness: how hard the gateway tries to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// Base interval. `0` spreads the attempts evenly over `retry_timeout_ms`.
    #[serde(default)]
    pub retry_interval_ms: u64,
    /// Retry window measured from submission (or restore). `0` = unbounded.
    #[serde(default)]
    pub retry_timeout_ms: u64,
    #[serde(default)]
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_interval_ms: 0,
            retry_timeout_ms: 0,
            strategy: RetryStrategy::SendOnce,
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed: the first one plus the retries.
    pub fn max_attempts(&self) -> u32 {
        match self.strategy {
            RetryStrategy::SendOnce => 1,
            _ => self.retry_count.saturating_add(1),
        }
    }

    fn base_interval_ms(&self) -> u64 {
        if self.retry_interval_ms > 0 {
            self.retry_interval_ms
        } else {
            self.retry_timeout_ms / u64::from(self.max_attempts())
        }
    }

    /// Delay before the next attempt, given the attempts already made.
    ///
    /// `None` when the strategy never retries.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        let base = self.base_interval_ms();
        let ms = match self.strategy {
            RetryStrategy::SendOnce => return None,
            RetryStrategy::Constant => base,
            RetryStrategy::Progressive => {
                let exponent = attempts_made.saturating_sub(1).min(32);
                base.saturating_mul(1u64 << exponent)
            }
        };
        Some(Duration::from_millis(ms).min(MAX_RETRY_INTERVAL))
    }

    /// Whether a retry may still start at `now` for a window opened at
    /// `scheduled_start`.
    pub fn window_open(&self, scheduled_start: Timestamp, now: Timestamp) -> bool {
        self.retry_timeout_ms == 0 || scheduled_start.saturating_add(self.retry_timeout_ms) > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPattern {
    /// Receipt comes back on the HTTP response.
    #[default]
    Response,
    /// Receipt is sent asynchronously.
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reliability {
    #[serde(default)]
    pub reply_pattern: ReplyPattern,
    /// Receipts carry non-repudiation information.
    #[serde(default)]
    pub non_repudiation: bool,
}

/// Split-and-join settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splitting {
    /// Maximum fragment size in bytes.
    pub fragment_size: u64,
    /// Compress the source message before cutting it.
    #[serde(default)]
    pub compression: bool,
    /// How long the receiver waits for a complete group.
    pub join_interval_ms: u64,
}

/// Concrete exchange rules for one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegConfiguration {
    pub name: String,
    pub service: String,
    pub action: String,
    /// Receiver endpoint, taken from the responder party when not set on the leg.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub default_mpc: Option<String>,
    #[serde(default)]
    pub reliability: Reliability,
    #[serde(default)]
    pub reception_awareness: RetryPolicy,
    #[serde(default)]
    pub compress_payloads: bool,
    #[serde(default)]
    pub splitting: Option<Splitting>,
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    30_000
}

impl LegConfiguration {
    pub fn max_attempts(&self) -> u32 {
        self.reception_awareness.max_attempts()
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            retry_count: 4,
            retry_interval_ms: 1_000,
            retry_timeout_ms: 0,
            strategy,
        }
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(policy(RetryStrategy::Constant).max_attempts(), 5);
        assert_eq!(policy(RetryStrategy::SendOnce).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 1);
    }

    #[test]
    fn test_constant_and_progressive_delays() {
        let constant = policy(RetryStrategy::Constant);
        assert_eq!(constant.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(constant.next_delay(3), Some(Duration::from_secs(1)));

        let progressive = policy(RetryStrategy::Progressive);
        assert_eq!(progressive.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(progressive.next_delay(3), Some(Duration::from_secs(4)));
        assert_eq!(progressive.next_delay(40), Some(MAX_RETRY_INTERVAL));

        assert_eq!(policy(RetryStrategy::SendOnce).next_delay(1), None);
    }

    #[test]
    fn test_interval_derived_from_timeout() {
        let policy = RetryPolicy {
            retry_count: 3,
            retry_interval_ms: 0,
            retry_timeout_ms: 60_000,
            strategy: RetryStrategy::Constant,
        };
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_retry_window() {
        let mut policy = policy(RetryStrategy::Constant);
        assert!(policy.window_open(0, u64::MAX));

        policy.retry_timeout_ms = 10_000;
        assert!(policy.window_open(1_000, 10_999));
        assert!(!policy.window_open(1_000, 11_000));
    }

    #[test]
    fn test_leg_json_defaults() {
        let leg: LegConfiguration = serde_json::from_str(
            r#"{"name":"leg1","service":"svc","action":"act"}"#,
        )
        .unwrap();
        assert_eq!(leg.max_attempts(), 1);
        assert_eq!(leg.dispatch_timeout(), Duration::from_secs(30));
        assert!(leg.splitting.is_none());
    }
}
