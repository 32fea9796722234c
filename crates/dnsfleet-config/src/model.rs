//! Settings model consumed by the sync engine, the health prober and the CLI.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// How a failed pre-write backup affects the attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy {
    /// Log a warning and continue with the write.
    #[default]
    BestEffort,
    /// Fail the attempt without writing.
    Required,
}

impl BackupPolicy {
    /// Stable label used in settings files and environment variables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Required => "required",
        }
    }

    /// Parse a label; returns `None` for unknown values.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim() {
            "best_effort" => Some(Self::BestEffort),
            "required" => Some(Self::Required),
            _ => None,
        }
    }
}

/// Tunables for synchronisation, transport and probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Upper bound on concurrently open remote sessions during fan-out.
    pub max_concurrent_sessions: usize,
    /// Seconds allowed for opening a session.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for each remote read, write, backup or command.
    pub operation_timeout_secs: u64,
    /// Effect of a failed backup.
    pub backup_policy: BackupPolicy,
    /// Remote directory holding `<name>.conf` domain-set files.
    pub domain_set_dir: PathBuf,
    /// Remote configuration path for nodes without an explicit one.
    pub default_config_path: PathBuf,
    /// Optional command run after a successful write (e.g. a daemon restart).
    pub reload_command: Option<String>,
    /// Command used by the health prober.
    pub health_command: String,
    /// Concurrent probes during a health sweep.
    pub health_concurrency: usize,
    /// Seconds between health sweeps when serving.
    pub health_interval_secs: u64,
    /// Capacity of the job queue.
    pub queue_capacity: usize,
    /// Accepted jobs executed at the same time.
    pub max_concurrent_jobs: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: defaults::MAX_CONCURRENT_SESSIONS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: defaults::OPERATION_TIMEOUT_SECS,
            backup_policy: BackupPolicy::default(),
            domain_set_dir: PathBuf::from(defaults::DOMAIN_SET_DIR),
            default_config_path: PathBuf::from(defaults::DEFAULT_CONFIG_PATH),
            reload_command: None,
            health_command: defaults::HEALTH_COMMAND.to_string(),
            health_concurrency: defaults::HEALTH_CONCURRENCY,
            health_interval_secs: defaults::HEALTH_INTERVAL_SECS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            max_concurrent_jobs: defaults::MAX_CONCURRENT_JOBS,
        }
    }
}

impl SyncSettings {
    /// Timeout applied to session establishment.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Timeout applied to every remote operation.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Interval between health sweeps.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}
