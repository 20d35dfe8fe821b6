use serde::{Deserialize, Serialize};

/// Tuning knobs consumed by the forwarder core. Field names and defaults
/// follow the configuration table: `DNS_CLIENT_WORKERS`, `DNS_QUEUE_MULTIPLIER`,
/// `DNS_PRIORITY_TIMEOUT_MS`, `DNS_CACHE_SIZE_MB`, `DNS_CACHE_CLEANUP_INTERVAL`,
/// `DNS_CACHE_ERROR_TTL`, `DNS_RATE_LIMIT_PER_IP`, `DNS_RATE_LIMIT_GLOBAL`,
/// `DNS_BAN_DURATION`, `DNS_MESSAGE_SIZE_LIMIT`, `DNS_VALIDATION_ENABLED`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub upstream_servers: Vec<String>,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_client_workers")]
    pub client_workers: usize,

    #[serde(default = "default_queue_multiplier")]
    pub queue_multiplier: usize,

    #[serde(default = "default_priority_timeout_ms")]
    pub priority_timeout_ms: u64,

    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,

    #[serde(default = "default_cache_size_mb")]
    pub cache_size_mb: u64,

    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,

    #[serde(default = "default_cache_error_ttl_secs")]
    pub cache_error_ttl_secs: u32,

    #[serde(default = "default_rate_limit_per_ip")]
    pub rate_limit_per_ip: u32,

    #[serde(default = "default_rate_limit_global")]
    pub rate_limit_global: u32,

    #[serde(default = "default_ban_duration_mins")]
    pub ban_duration_mins: u64,

    #[serde(default = "default_message_size_limit")]
    pub message_size_limit: usize,

    #[serde(default = "default_true")]
    pub validation_enabled: bool,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub pool: TcpPoolConfig,

    #[serde(default)]
    pub capability: CapabilityProbeConfig,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream_servers: vec!["8.8.8.8:53".to_string(), "1.1.1.1:53".to_string()],
            query_timeout_secs: default_query_timeout_secs(),
            client_workers: default_client_workers(),
            queue_multiplier: default_queue_multiplier(),
            priority_timeout_ms: default_priority_timeout_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
            cache_size_mb: default_cache_size_mb(),
            cache_cleanup_interval_secs: default_cache_cleanup_interval_secs(),
            cache_error_ttl_secs: default_cache_error_ttl_secs(),
            rate_limit_per_ip: default_rate_limit_per_ip(),
            rate_limit_global: default_rate_limit_global(),
            ban_duration_mins: default_ban_duration_mins(),
            message_size_limit: default_message_size_limit(),
            validation_enabled: true,
            health_check: HealthCheckConfig::default(),
            pool: TcpPoolConfig::default(),
            capability: CapabilityProbeConfig::default(),
        }
    }
}

/// Background health-checker cadence; the EWMA/circuit-breaker math itself
/// is fixed (see `infrastructure::dns::health`) and not user-tunable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_stale_server_interval_secs")]
    pub stale_server_interval_secs: u64,

    #[serde(default = "default_circuit_probe_interval_secs")]
    pub circuit_probe_interval_secs: u64,

    #[serde(default = "default_medium_score_drift_interval_secs")]
    pub medium_score_drift_interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_server_interval_secs: default_stale_server_interval_secs(),
            circuit_probe_interval_secs: default_circuit_probe_interval_secs(),
            medium_score_drift_interval_secs: default_medium_score_drift_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpPoolConfig {
    #[serde(default = "default_max_connections_per_server")]
    pub max_connections_per_server: usize,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TcpPoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_server: default_max_connections_per_server(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapabilityProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_probe_workers")]
    pub workers: usize,

    #[serde(default = "default_probe_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_full_refresh_interval_secs")]
    pub full_refresh_interval_secs: u64,
}

impl Default for CapabilityProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_probe_workers(),
            queue_capacity: default_probe_queue_capacity(),
            full_refresh_interval_secs: default_full_refresh_interval_secs(),
        }
    }
}

fn default_query_timeout_secs() -> u64 {
    5
}
fn default_client_workers() -> usize {
    10_000
}
fn default_queue_multiplier() -> usize {
    2
}
fn default_priority_timeout_ms() -> u64 {
    50
}
fn default_overall_timeout_ms() -> u64 {
    5_000
}
fn default_cache_size_mb() -> u64 {
    100
}
fn default_cache_cleanup_interval_secs() -> u64 {
    60
}
fn default_cache_error_ttl_secs() -> u32 {
    3_600
}
fn default_rate_limit_per_ip() -> u32 {
    60
}
fn default_rate_limit_global() -> u32 {
    10_000
}
fn default_ban_duration_mins() -> u64 {
    5
}
fn default_message_size_limit() -> usize {
    4_096
}
fn default_true() -> bool {
    true
}
fn default_stale_server_interval_secs() -> u64 {
    60
}
fn default_circuit_probe_interval_secs() -> u64 {
    1
}
fn default_medium_score_drift_interval_secs() -> u64 {
    10
}
fn default_max_connections_per_server() -> usize {
    2
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_probe_workers() -> usize {
    5
}
fn default_probe_queue_capacity() -> usize {
    1_000
}
fn default_full_refresh_interval_secs() -> u64 {
    300
}
