//! Default values for [`SyncSettings`](crate::SyncSettings).

/// Upper bound on concurrently open remote sessions.
pub const MAX_CONCURRENT_SESSIONS: usize = 8;
/// Seconds allowed for establishing a remote session.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Seconds allowed for any single remote operation.
pub const OPERATION_TIMEOUT_SECS: u64 = 30;
/// Directory holding domain-set list files on each node.
pub const DOMAIN_SET_DIR: &str = "/etc/smartdns";
/// Main configuration file used when a node does not override it.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/smartdns/smartdns.conf";
/// Command whose exit status reports whether the resolver daemon is running.
pub const HEALTH_COMMAND: &str = "systemctl is-active smartdns";
/// Concurrent health probes.
pub const HEALTH_CONCURRENCY: usize = 16;
/// Seconds between periodic health sweeps.
pub const HEALTH_INTERVAL_SECS: u64 = 60;
/// Jobs executed at the same time.
pub const MAX_CONCURRENT_JOBS: usize = 4;
/// Jobs buffered on the sync queue before submissions are rejected.
pub const QUEUE_CAPACITY: usize = 256;
