//! Response cache: in-memory, keyed on (qname, qtype, qclass), TTL from
//! answer records with pressure-driven eviction under a byte budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ferrous_dns_application::ports::{CacheSweeper, ResponseCache as ResponseCachePort};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType as HickoryRecordType;
use tracing::debug;

const DEFAULT_TTL_SECS: u32 = 3600;

fn default_ttl_for(record_type: HickoryRecordType) -> u32 {
    match record_type {
        HickoryRecordType::A | HickoryRecordType::AAAA => 300,
        HickoryRecordType::NS | HickoryRecordType::SOA => 3600,
        HickoryRecordType::MX | HickoryRecordType::TXT => 1800,
        _ => DEFAULT_TTL_SECS,
    }
}

fn cache_key(message: &Message) -> Option<String> {
    let q = message.queries().first()?;
    Some(format!(
        "{}|{}|{}",
        q.name().to_ascii().to_ascii_lowercase(),
        q.query_type(),
        q.query_class()
    ))
}

fn approx_size(message: &Message) -> u64 {
    // Approximate serialized length: header + rough per-record estimate.
    let answers: u64 = message.answers().len() as u64 * 64;
    let extra: u64 = message.name_servers().len() as u64 * 64 + message.additionals().len() as u64 * 32;
    12 + answers + extra + 64
}

struct CacheEntry {
    response: Message,
    expires_at: Instant,
    size: u64,
    last_access: AtomicU64,
}

/// Byte-budget-aware response cache with LRU-by-last-access eviction.
///
/// Eviction runs inline on `set`, under the same conceptual write path,
/// trimming a fraction of entries once the cache crosses a pressure
/// threshold (75/80/90% of `cap_bytes` trims 20/30/50%).
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    total_bytes: AtomicU64,
    cap_bytes: u64,
    error_ttl: u32,
    epoch: Instant,
    eviction_lock: RwLock<()>,
}

impl ResponseCache {
    pub fn new(cap_bytes: u64, error_ttl_secs: u32) -> Self {
        Self {
            entries: DashMap::new(),
            total_bytes: AtomicU64::new(0),
            cap_bytes,
            error_ttl: error_ttl_secs,
            epoch: Instant::now(),
            eviction_lock: RwLock::new(()),
        }
    }

    fn now_ticks(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn ttl_for(message: &Message, error_ttl: u32) -> u32 {
        if message.response_code() != ResponseCode::NoError {
            return error_ttl;
        }
        if let Some(first) = message.answers().first() {
            if first.ttl() > 0 {
                return first.ttl();
            }
        }
        match message.queries().first() {
            Some(q) => default_ttl_for(q.query_type()),
            None => DEFAULT_TTL_SECS,
        }
    }

    fn maybe_evict(&self) {
        let cap = self.cap_bytes as f64;
        let used = self.total_bytes.load(Ordering::Relaxed) as f64;
        if cap <= 0.0 {
            return;
        }
        let ratio = used / cap;
        let trim_fraction = if ratio >= 0.90 {
            0.50
        } else if ratio >= 0.80 {
            0.30
        } else if ratio >= 0.75 {
            0.20
        } else {
            return;
        };

        let _guard = self.eviction_lock.write().unwrap();
        let target_bytes = (used * trim_fraction) as u64;
        let mut freed = 0u64;

        let mut candidates: Vec<(String, u64, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.last_access.load(Ordering::Relaxed), e.size))
            .collect();
        candidates.sort_by_key(|(_, last_access, _)| *last_access);

        for (key, _, size) in candidates {
            if freed >= target_bytes.max(1) {
                break;
            }
            if self.entries.remove(&key).is_some() {
                freed += size;
                self.total_bytes.fetch_sub(size, Ordering::Relaxed);
            }
        }
    }

    /// Drops entries past their expiry. Meant to be driven by a periodic
    /// sweeper job (`DNS_CACHE_CLEANUP_INTERVAL`).
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();
        let count = expired.len();
        for key in expired {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
            }
        }
        count
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResponseCachePort for ResponseCache {
    fn get(&self, query: &Message) -> Option<Message> {
        let key = cache_key(query)?;
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > now {
                entry.last_access.store(self.now_ticks(), Ordering::Relaxed);
                let mut response = entry.response.clone();
                response.set_id(query.id());
                return Some(response);
            }
        }

        if let Some((_, entry)) = self.entries.remove(&key) {
            self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
            debug!(key = %key, "evicted expired cache entry on read");
        }
        None
    }

    fn set(&self, response: &Message) {
        let Some(key) = cache_key(response) else { return };
        let ttl = Self::ttl_for(response, self.error_ttl);
        let size = approx_size(response);

        if let Some((_, old)) = self.entries.remove(&key) {
            self.total_bytes.fetch_sub(old.size, Ordering::Relaxed);
        }

        self.entries.insert(
            key,
            CacheEntry {
                response: response.clone(),
                expires_at: Instant::now() + Duration::from_secs(ttl as u64),
                size,
                last_access: AtomicU64::new(self.now_ticks()),
            },
        );
        self.total_bytes.fetch_add(size, Ordering::Relaxed);

        self.maybe_evict();
    }

    fn delete_by_domain(&self, domain: &str) -> usize {
        let needle = domain.to_ascii_lowercase();
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().contains(&needle))
            .map(|e| e.key().clone())
            .collect();
        let count = matching.len();
        for key in matching {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
            }
        }
        count
    }
}

impl CacheSweeper for ResponseCache {
    fn sweep_expired(&self) -> usize {
        ResponseCache::sweep_expired(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{DNSClass, Name, RData, Record};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn query_message(id: u16, name: &str) -> Message {
        let mut message = Message::new(id, MessageType::Query, OpCode::Query);
        let mut query = Query::new();
        query.set_name(Name::from_str(name).unwrap());
        query.set_query_type(HickoryRecordType::A);
        query.set_query_class(DNSClass::IN);
        message.add_query(query);
        message
    }

    fn response_message(id: u16, name: &str, ttl: u32) -> Message {
        let mut message = query_message(id, name);
        message.set_message_type(MessageType::Response);
        let record = Record::from_rdata(Name::from_str(name).unwrap(), ttl, RData::A(Ipv4Addr::new(93, 184, 216, 34).into()));
        message.add_answer(record);
        message
    }

    #[test]
    fn round_trip_restores_querier_id() {
        let cache = ResponseCache::new(1_000_000, 3600);
        cache.set(&response_message(7, "example.com.", 60));
        let got = cache.get(&query_message(99, "example.com.")).unwrap();
        assert_eq!(got.id(), 99);
        assert_eq!(got.answers().len(), 1);
    }

    #[test]
    fn expired_entry_returns_none_and_frees_its_size() {
        let cache = ResponseCache::new(1_000_000, 3600);
        cache.set(&response_message(1, "example.com.", 0));
        // ttl 0 falls back to the per-type default (300s for A), so force
        // expiry by inserting directly with an already-past expiry.
        let key = cache_key(&query_message(1, "example.com.")).unwrap();
        if let Some(mut entry) = cache.entries.get_mut(&key) {
            entry.expires_at = Instant::now() - Duration::from_secs(1);
        }
        assert!(cache.get(&query_message(2, "example.com.")).is_none());
        assert!(!cache.entries.contains_key(&key));
    }

    #[test]
    fn delete_by_domain_removes_matching_keys() {
        let cache = ResponseCache::new(1_000_000, 3600);
        cache.set(&response_message(1, "foo.example.com.", 60));
        cache.set(&response_message(1, "bar.example.com.", 60));
        cache.set(&response_message(1, "other.net.", 60));
        let removed = cache.delete_by_domain("example.com");
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_trims_under_pressure() {
        let cache = ResponseCache::new(1000, 3600);
        for i in 0..30u16 {
            cache.set(&response_message(i, &format!("host{i}.example.com."), 60));
        }
        assert!(cache.total_bytes() <= 1000 || cache.len() < 30);
    }
}
