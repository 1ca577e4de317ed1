//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Record a `MessageAttempt` for every attempt. Status transitions are
    /// identical either way.
    pub attempt_audit_active: bool,
    /// Drop the payload of a message once it becomes `SendFailure`.
    pub delete_payload_on_send_failure: bool,
    /// Upper bound on dispatches running at the same time.
    pub max_concurrent_dispatches: usize,
    /// Suffix of generated message ids (`<uuid>@<suffix>`).
    pub message_id_suffix: String,
    /// Staging area for source messages and their fragments.
    pub outbox_dir: PathBuf,
    /// How often a dispatch for a not-yet-visible message is re-queued.
    pub max_lookup_retries: u32,
    pub lookup_retry_delay: Duration,
    /// How long `shutdown` waits for in-flight attempts.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            attempt_audit_active: true,
            delete_payload_on_send_failure: false,
            max_concurrent_dispatches: 32,
            message_id_suffix: "msh.gateway".to_string(),
            outbox_dir: std::env::temp_dir().join("msh").join("outbox"),
            max_lookup_retries: 3,
            lookup_retry_delay: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    pub fn for_testing(outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
            lookup_retry_delay: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.outbox_dir.join("sources")
    }

    pub fn fragments_dir(&self) -> PathBuf {
        self.outbox_dir.join("fragments")
    }
}
