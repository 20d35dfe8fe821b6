mod authoritative_zone;
mod config_source;
mod forwarder;
mod maintenance;
mod rate_limiter;
mod response_cache;
mod statistics_sink;

pub use authoritative_zone::{AuthoritativeZoneMatcher, NoAuthoritativeZones};
pub use config_source::ConfigSource;
pub use forwarder::DnsForwarder;
pub use maintenance::{
    CacheSweeper, CapabilityMaintenance, CookieMaintenance, HealthMaintenance, MatchCacheSweeper,
    RateLimiterMaintenance,
};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use response_cache::ResponseCache;
pub use statistics_sink::{NetworkSample, QpsSample, ResourceSample, StatisticsSink};
