//! Per-IP token bucket (16 shards) plus a global bucket, with a ban after
//! repeated violations. §4.11 step 2.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use ferrous_dns_application::ports::{RateLimitDecision, RateLimiter as RateLimiterPort, RateLimiterMaintenance};

const SHARD_COUNT: usize = 16;
const WINDOW: Duration = Duration::from_secs(60);
const CONSECUTIVE_VIOLATIONS_TO_BAN: u32 = 5;
const CLEANUP_IDLE_THRESHOLD: Duration = Duration::from_secs(3600);

struct ClientState {
    window_start: Instant,
    count: u32,
    consecutive_violations: u32,
    banned_until: Option<Instant>,
    last_activity: Instant,
}

impl ClientState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            consecutive_violations: 0,
            banned_until: None,
            last_activity: now,
        }
    }
}

struct GlobalBucket {
    window_start: AtomicI64,
    count: AtomicU32,
    limit: u32,
}

impl GlobalBucket {
    fn new(limit: u32, now: Instant, epoch: Instant) -> Self {
        Self {
            window_start: AtomicI64::new(now.duration_since(epoch).as_millis() as i64),
            count: AtomicU32::new(0),
            limit,
        }
    }
}

/// Sharded per-IP token bucket, ban-on-repeated-violation, plus a single
/// global bucket shared across all clients.
pub struct TokenBucketRateLimiter {
    shards: Vec<RwLock<HashMap<IpAddr, ClientState>>>,
    per_ip_limit: u32,
    ban_duration: Duration,
    global: GlobalBucket,
    epoch: Instant,
}

impl TokenBucketRateLimiter {
    pub fn new(per_ip_limit: u32, global_limit: u32, ban_duration: Duration) -> Self {
        let epoch = Instant::now();
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            per_ip_limit,
            ban_duration,
            global: GlobalBucket::new(global_limit, epoch, epoch),
            epoch,
        }
    }

    fn shard_for(&self, ip: &IpAddr) -> &RwLock<HashMap<IpAddr, ClientState>> {
        let hash = match ip {
            IpAddr::V4(v4) => u32::from_be_bytes(v4.octets()) as u64,
            IpAddr::V6(v6) => {
                let octets = v6.octets();
                u64::from_be_bytes(octets[8..16].try_into().unwrap())
            }
        };
        &self.shards[(hash as usize) % SHARD_COUNT]
    }

    fn check_global(&self, now: Instant) -> bool {
        let now_ms = now.duration_since(self.epoch).as_millis() as i64;
        let window_start = self.global.window_start.load(Ordering::Relaxed);
        if now_ms - window_start >= WINDOW.as_millis() as i64 {
            self.global.window_start.store(now_ms, Ordering::Relaxed);
            self.global.count.store(0, Ordering::Relaxed);
        }
        let count = self.global.count.fetch_add(1, Ordering::Relaxed) + 1;
        count <= self.global.limit
    }

    /// Drops per-IP entries idle for more than an hour. Meant to be run
    /// every 10 minutes by a background sweeper.
    pub fn cleanup_idle(&self) {
        let now = Instant::now();
        for shard_lock in &self.shards {
            let mut shard = shard_lock.write().unwrap();
            shard.retain(|_, state| now.duration_since(state.last_activity) < CLEANUP_IDLE_THRESHOLD);
        }
    }
}

impl RateLimiterPort for TokenBucketRateLimiter {
    fn check(&self, client_ip: IpAddr) -> RateLimitDecision {
        let now = Instant::now();

        let shard = self.shard_for(&client_ip);
        let mut guard = shard.write().unwrap();
        let state = guard.entry(client_ip).or_insert_with(|| ClientState::new(now));
        state.last_activity = now;

        if let Some(until) = state.banned_until {
            if now < until {
                return RateLimitDecision::Banned;
            }
            state.banned_until = None;
            state.consecutive_violations = 0;
        }

        if now.duration_since(state.window_start) >= WINDOW {
            state.window_start = now;
            state.count = 0;
        }
        state.count += 1;

        if state.count > self.per_ip_limit {
            state.consecutive_violations += 1;
            if state.consecutive_violations >= CONSECUTIVE_VIOLATIONS_TO_BAN {
                state.banned_until = Some(now + self.ban_duration);
                return RateLimitDecision::Banned;
            }
            return RateLimitDecision::Refuse;
        }
        state.consecutive_violations = 0;
        drop(guard);

        if !self.check_global(now) {
            return RateLimitDecision::Refuse;
        }

        RateLimitDecision::Allow
    }
}

impl RateLimiterMaintenance for TokenBucketRateLimiter {
    fn cleanup_idle(&self) {
        TokenBucketRateLimiter::cleanup_idle(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn burst_over_limit_refuses_exact_excess() {
        let limiter = TokenBucketRateLimiter::new(10, 10_000, Duration::from_secs(300));
        let client = ip(1);
        let mut refusals = 0;
        for _ in 0..15 {
            match limiter.check(client) {
                RateLimitDecision::Allow => {}
                RateLimitDecision::Refuse | RateLimitDecision::Banned => refusals += 1,
            }
        }
        assert_eq!(refusals, 5);
    }

    #[test]
    fn repeated_violations_trigger_ban() {
        let limiter = TokenBucketRateLimiter::new(1, 10_000, Duration::from_secs(300));
        let client = ip(2);
        let mut banned = false;
        for _ in 0..10 {
            if matches!(limiter.check(client), RateLimitDecision::Banned) {
                banned = true;
                break;
            }
        }
        assert!(banned);
    }

    #[test]
    fn distinct_ips_have_independent_budgets() {
        let limiter = TokenBucketRateLimiter::new(1, 10_000, Duration::from_secs(300));
        assert_eq!(limiter.check(ip(10)), RateLimitDecision::Allow);
        assert_eq!(limiter.check(ip(11)), RateLimitDecision::Allow);
    }
}
