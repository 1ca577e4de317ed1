//! # Gateway Configuration
//!
//! One aggregate of every subsystem's configuration, read from `MSH_*`
//! environment variables over defaults and validated before anything is
//! opened.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MSH_DATA_DIR` | `./data` |
//! | `MSH_PMODE_DIR` | `./pmodes` (one `<domain>.json` per domain) |
//! | `MSH_DOMAINS` | `default` (comma separated) |
//! | `MSH_STORAGE_BACKEND` | `file` (`file`, `rocksdb`, `memory`) |
//! | `MSH_ATTEMPT_AUDIT` | `true` |
//! | `MSH_NONREPUDIATION_AUDIT` | `true` |
//! | `MSH_DISPATCH_TIMEOUT_MS` | `60000` |
//! | `MSH_MAX_CONCURRENT_DISPATCHES` | `32` |
//! | `MSH_DELETE_PAYLOAD_ON_FAILURE` | `false` |
//! | `MSH_MAINTENANCE_INTERVAL_MS` | `60000` |
//! | `MSH_MESSAGE_ID_SUFFIX` | `msh.gateway` |

use msh_01_message_store::StoreConfig;
use msh_03_split_and_join::SplitAndJoinConfig;
use msh_04_retry_scheduler::SchedulerConfig;
use msh_05_non_repudiation::NonRepudiationConfig;
use shared_types::DomainId;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Snapshot files under the data directory.
    File,
    RocksDb,
    /// Nothing survives a restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "rocksdb" => Ok(Self::RocksDb),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid {
                key: "MSH_STORAGE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("No domains configured")]
    NoDomains,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("RocksDB backend requested but the binary was built without the `rocksdb` feature")]
    RocksDbUnavailable,
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub pmode_dir: PathBuf,
    pub domains: Vec<DomainId>,
    pub storage_backend: StorageBackend,
    /// Upper bound on one HTTP exchange; legs may ask for less.
    pub dispatch_timeout: Duration,
    pub maintenance_interval: Duration,
    /// Refuse to start below this share of free disk space.
    pub min_disk_space_percent: u8,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub non_repudiation: NonRepudiationConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            pmode_dir: PathBuf::from("./pmodes"),
            domains: vec![DomainId::default_domain()],
            storage_backend: StorageBackend::File,
            dispatch_timeout: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(60),
            min_disk_space_percent: 5,
            store: StoreConfig::default(),
            scheduler: SchedulerConfig {
                outbox_dir: data_dir.join("outbox"),
                ..SchedulerConfig::default()
            },
            non_repudiation: NonRepudiationConfig::default(),
            data_dir,
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("MSH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.scheduler.outbox_dir = config.data_dir.join("outbox");
        }
        if let Some(dir) = lookup("MSH_PMODE_DIR") {
            config.pmode_dir = PathBuf::from(dir);
        }
        if let Some(domains) = lookup("MSH_DOMAINS") {
            config.domains = domains
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| {
                    DomainId::new(d).map_err(|_| ConfigError::Invalid {
                        key: "MSH_DOMAINS",
                        value: d.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(backend) = lookup("MSH_STORAGE_BACKEND") {
            config.storage_backend = backend.parse()?;
        }
        if let Some(flag) = lookup("MSH_ATTEMPT_AUDIT") {
            config.scheduler.attempt_audit_active = parse_bool("MSH_ATTEMPT_AUDIT", &flag)?;
        }
        if let Some(flag) = lookup("MSH_NONREPUDIATION_AUDIT") {
            config.non_repudiation.audit_active = parse_bool("MSH_NONREPUDIATION_AUDIT", &flag)?;
        }
        if let Some(flag) = lookup("MSH_DELETE_PAYLOAD_ON_FAILURE") {
            config.scheduler.delete_payload_on_send_failure =
                parse_bool("MSH_DELETE_PAYLOAD_ON_FAILURE", &flag)?;
        }
        if let Some(ms) = lookup("MSH_DISPATCH_TIMEOUT_MS") {
            config.dispatch_timeout =
                Duration::from_millis(parse_number("MSH_DISPATCH_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = lookup("MSH_MAINTENANCE_INTERVAL_MS") {
            config.maintenance_interval =
                Duration::from_millis(parse_number("MSH_MAINTENANCE_INTERVAL_MS", &ms)?);
        }
        if let Some(n) = lookup("MSH_MAX_CONCURRENT_DISPATCHES") {
            config.scheduler.max_concurrent_dispatches =
                parse_number("MSH_MAX_CONCURRENT_DISPATCHES", &n)? as usize;
        }
        if let Some(suffix) = lookup("MSH_MESSAGE_ID_SUFFIX") {
            config.scheduler.message_id_suffix = suffix;
        }

        Ok(config)
    }

    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }
        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Zero("MSH_DISPATCH_TIMEOUT_MS"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::Zero("MSH_MAINTENANCE_INTERVAL_MS"));
        }
        if self.scheduler.max_concurrent_dispatches == 0 {
            return Err(ConfigError::Zero("MSH_MAX_CONCURRENT_DISPATCHES"));
        }
        if self.scheduler.message_id_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "MSH_MESSAGE_ID_SUFFIX",
                value: String::new(),
            });
        }
        if self.storage_backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::RocksDbUnavailable);
        }
        Ok(())
    }

    pub fn split_and_join(&self) -> SplitAndJoinConfig {
        SplitAndJoinConfig::under(self.data_dir.join("split-and-join"))
    }

    /// PMode document of one domain.
    pub fn pmode_file(&self, domain: &DomainId) -> PathBuf {
        self.pmode_dir.join(format!("{}.json", domain.as_str()))
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.domains, vec![DomainId::default_domain()]);
        assert!(config.scheduler.attempt_audit_active);
        assert!(config.non_repudiation.audit_active);
    }

    #[test]
    fn test_environment_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("MSH_DATA_DIR", "/var/lib/msh"),
            ("MSH_DOMAINS", "blue, red"),
            ("MSH_STORAGE_BACKEND", "memory"),
            ("MSH_ATTEMPT_AUDIT", "false"),
            ("MSH_NONREPUDIATION_AUDIT", "off"),
            ("MSH_DISPATCH_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/msh"));
        assert_eq!(config.scheduler.outbox_dir, PathBuf::from("/var/lib/msh/outbox"));
        assert_eq!(
            config.domains,
            vec![DomainId::new("blue").unwrap(), DomainId::new("red").unwrap()]
        );
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(!config.scheduler.attempt_audit_active);
        assert!(!config.non_repudiation.audit_active);
        assert_eq!(config.dispatch_timeout, Duration::from_millis(1500));
        assert_eq!(
            config.pmode_file(&DomainId::new("red").unwrap()),
            PathBuf::from("./pmodes/red.json")
        );
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("MSH_ATTEMPT_AUDIT", "maybe")])),
            Err(ConfigError::Invalid { key: "MSH_ATTEMPT_AUDIT", .. })
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("MSH_DOMAINS", "Blue")])),
            Err(ConfigError::Invalid { key: "MSH_DOMAINS", .. })
        ));
        assert!(GatewayConfig::from_lookup(lookup(&[("MSH_STORAGE_BACKEND", "postgres")])).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = GatewayConfig::default();
        config.domains.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoDomains));

        let mut config = GatewayConfig::default();
        config.dispatch_timeout = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::Zero("MSH_DISPATCH_TIMEOUT_MS")));
    }
}
