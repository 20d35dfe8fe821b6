/// Sweeps expired entries out of the response cache. Implemented in
/// infrastructure by `ResponseCache`.
pub trait CacheSweeper: Send + Sync {
    fn sweep_expired(&self) -> usize;
}

/// Sweeps expired entries out of the trie's match cache. Implemented in
/// infrastructure by `MatchCache`.
pub trait MatchCacheSweeper: Send + Sync {
    fn sweep_expired(&self) -> usize;
}

/// Background health upkeep that isn't driven by live traffic: medium-score
/// drift, stale/low-score re-probing, and circuit-breaker recovery probing.
/// Implemented in infrastructure by `ForwarderDispatcher`.
#[async_trait::async_trait]
pub trait HealthMaintenance: Send + Sync {
    fn apply_medium_score_drift(&self);
    async fn probe_stale_servers(&self);
    async fn probe_low_score_servers(&self);
    async fn probe_circuit_broken_servers(&self);
}

/// Re-enqueues every known upstream for capability probing. Implemented in
/// infrastructure by `CapabilityProber`.
pub trait CapabilityMaintenance: Send + Sync {
    fn full_refresh(&self);
}

/// Drops stale cookie-failure-suppression entries. Implemented in
/// infrastructure by `CookieStore`.
pub trait CookieMaintenance: Send + Sync {
    fn purge_stale_failures(&self);
}

/// Drops idle per-IP rate-limit state. Implemented in infrastructure by
/// `TokenBucketRateLimiter`.
pub trait RateLimiterMaintenance: Send + Sync {
    fn cleanup_idle(&self);
}
