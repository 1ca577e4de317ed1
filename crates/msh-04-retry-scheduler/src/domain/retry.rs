//! # Retry Decisions
//!
//! What happens to a message after a failed attempt. Pure: the caller
//! supplies the message as it was when the attempt began.

use msh_01_message_store::Message;
use msh_02_leg_configuration::RetryPolicy;
use shared_types::Timestamp;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    NotRetryable,
    AttemptsExhausted,
    /// The reception-awareness window closed.
    WindowClosed,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotRetryable => "failure is not retryable",
            Self::AttemptsExhausted => "attempts exhausted",
            Self::WindowClosed => "retry window closed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(Timestamp),
    GiveUp(GiveUpReason),
}

/// Decide the fate of `message` after a failed attempt.
///
/// The next attempt is spaced from the previous scheduled time, so a slow
/// dispatch does not push the whole schedule back.
pub fn decide(
    message: &Message,
    policy: &RetryPolicy,
    retryable: bool,
    now: Timestamp,
) -> RetryDecision {
    if !retryable {
        return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
    }
    let attempts_made = message.send_attempts.saturating_add(1);
    if attempts_made >= message.send_attempts_max {
        return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
    }
    if !policy.window_open(message.scheduled_start(), now) {
        return RetryDecision::GiveUp(GiveUpReason::WindowClosed);
    }
    let Some(delay) = policy.next_delay(attempts_made) else {
        return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
    };

    let base = message
        .next_attempt
        .or(message.attempt_started)
        .unwrap_or(now);
    RetryDecision::RetryAt(base.saturating_add(delay.as_millis() as Timestamp))
}
