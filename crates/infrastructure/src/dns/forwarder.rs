//! Forwarder dispatcher: group selection, tiered hedging across priority
//! bands, cancellation-token fan-in. §4.8.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ferrous_dns_application::ports::{AuthoritativeZoneMatcher, DnsForwarder, HealthMaintenance, MatchCacheSweeper};
use ferrous_dns_domain::{DomainError, ForwardGroup, RecordType};
use hickory_proto::op::{Message, ResponseCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dns::capability::CapabilityProber;
use crate::dns::cookie::CookieStore;
use crate::dns::exchange::{self, ExchangeContext};
use crate::dns::health::{self, ServerRuntimeState};
use crate::dns::tcp_pool::TcpConnectionPool;
use crate::dns::trie::MatchCache;

/// Outcome of one per-server exchange task, fed into the completion
/// channel the dispatcher selects over.
struct BandResult {
    message: Option<Message>,
    error: Option<DomainError>,
}

/// Owns the routing trie/match-cache, the per-server runtime state map,
/// and the shared cookie store / TCP pool used by every exchange.
pub struct ForwarderDispatcher {
    groups: RwLock<HashMap<u32, ForwardGroup>>,
    match_cache: MatchCache,
    server_states: RwLock<HashMap<SocketAddr, Arc<RwLock<ServerRuntimeState>>>>,
    exchange_ctx: ExchangeContext,
    zone_matcher: Arc<dyn AuthoritativeZoneMatcher>,
    prober: Arc<CapabilityProber>,
    priority_interval: Duration,
    overall_timeout: Duration,
}

impl ForwarderDispatcher {
    pub fn new(
        trie: crate::dns::trie::DomainTrie,
        pool: Arc<TcpConnectionPool>,
        cookies: Arc<CookieStore>,
        zone_matcher: Arc<dyn AuthoritativeZoneMatcher>,
        prober: Arc<CapabilityProber>,
        priority_interval: Duration,
        overall_timeout: Duration,
    ) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            match_cache: MatchCache::new(trie),
            server_states: RwLock::new(HashMap::new()),
            exchange_ctx: ExchangeContext { pool, cookies, prober: prober.clone() },
            zone_matcher,
            prober,
            priority_interval,
            overall_timeout,
        }
    }

    /// Replaces the known groups, rebuilding the trie and flushing the
    /// match cache. Also prunes `ServerRuntimeState` entries no longer
    /// referenced by any group (the reload cleanup invariant in §3), and
    /// seeds the capability prober with every configured upstream so the
    /// first probe for each address actually gets enqueued (nothing else
    /// ever submits one for a server that hasn't failed/downgraded yet).
    pub fn reload_groups(&self, groups: Vec<ForwardGroup>) {
        let mut active: std::collections::HashSet<SocketAddr> = std::collections::HashSet::new();

        {
            let mut by_id = self.groups.write().unwrap();
            by_id.clear();
            for group in groups {
                for (_, server) in group.all_servers() {
                    let addr = server.socket_addr();
                    active.insert(addr);
                    self.prober.submit_probe(addr);
                }
                if group.enabled {
                    self.match_cache.trie().insert(&group.domain, group.id);
                }
                by_id.insert(group.id, group);
            }
        }
        self.match_cache.flush();

        let mut states = self.server_states.write().unwrap();
        states.retain(|addr, _| active.contains(addr));
    }

    fn state_for(&self, addr: SocketAddr) -> Arc<RwLock<ServerRuntimeState>> {
        let mut states = self.server_states.write().unwrap();
        states
            .entry(addr)
            .or_insert_with(|| Arc::new(RwLock::new(ServerRuntimeState::new(Instant::now()))))
            .clone()
    }

    fn resolve_group(&self, qname: &str) -> Option<ForwardGroup> {
        let group_id = self
            .match_cache
            .resolve(qname)
            .unwrap_or(ForwardGroup::DEFAULT_GROUP_ID);
        self.groups.read().unwrap().get(&group_id).cloned()
    }

    fn qname_of(query: &Message) -> Option<String> {
        query.queries().first().map(|q| q.name().to_ascii())
    }

    async fn dispatch_group(&self, group: &ForwardGroup, query: &Message) -> Result<Message, DomainError> {
        if group.is_empty() {
            return Err(DomainError::EmptyGroup(group.domain.clone()));
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<BandResult>();
        let mut non_noerror_stash: Vec<BandResult> = Vec::new();
        let mut spawned_any = false;

        let priorities: Vec<u8> = group.servers.keys().copied().collect();
        for (band_idx, priority) in priorities.iter().enumerate() {
            let mut candidates: Vec<(SocketAddr, f64)> = group.servers[priority]
                .iter()
                .map(|s| s.socket_addr())
                .filter_map(|addr| {
                    let state = self.state_for(addr);
                    let guard = state.read().unwrap();
                    guard.is_available().then_some((addr, guard.score))
                })
                .collect();
            candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

            if candidates.is_empty() {
                continue;
            }

            for (addr, score) in &candidates {
                let total_delay = Duration::from_millis((band_idx as u64) * self.priority_interval.as_millis() as u64)
                    + health::tiered_hedge_delay(*score);
                let tx = tx.clone();
                let cancel = cancel.clone();
                let state = self.state_for(*addr);
                let ctx = ExchangeContext {
                    pool: self.exchange_ctx.pool.clone(),
                    cookies: self.exchange_ctx.cookies.clone(),
                    prober: self.exchange_ctx.prober.clone(),
                };
                let addr = *addr;
                let query = query.clone();
                let prober = self.prober.clone();
                spawned_any = true;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(total_delay) => {}
                    }
                    if cancel.is_cancelled() {
                        return;
                    }

                    let capabilities = prober.capabilities(addr);
                    let result = exchange::exchange_with_cookie(&ctx, addr, &query, capabilities, &state).await;

                    let band_result = match result {
                        Ok(message) => BandResult { message: Some(message), error: None },
                        Err(err) => BandResult { message: None, error: Some(err) },
                    };
                    // Best-effort: a send that arrives after cancellation
                    // is still delivered so a near-race isn't wasted.
                    let _ = tx.send(band_result);
                });
            }

            if !self.wait_band_or_noerror(&mut rx, &mut non_noerror_stash, &cancel).await {
                // A NOERROR arrived during the wait — stop scheduling
                // further bands and go straight to collection.
                break;
            }
        }
        drop(tx);

        if !spawned_any {
            return Err(DomainError::UpstreamUnavailable(group.domain.clone()));
        }

        let result = self.collect_until_timeout(rx, non_noerror_stash).await;
        cancel.cancel();
        result
    }

    /// Waits up to `priority_interval` for a NOERROR response, stashing
    /// any non-NOERROR results seen along the way. Returns `false` if a
    /// NOERROR arrived (caller should stop scheduling further bands).
    async fn wait_band_or_noerror(
        &self,
        rx: &mut mpsc::UnboundedReceiver<BandResult>,
        stash: &mut Vec<BandResult>,
        cancel: &CancellationToken,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + self.priority_interval;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining) => return true,
                maybe = rx.recv() => {
                    match maybe {
                        Some(result) if is_noerror(&result) => {
                            cancel.cancel();
                            stash.push(result);
                            return false;
                        }
                        Some(result) => stash.push(result),
                        None => return true,
                    }
                }
            }
        }
    }

    async fn collect_until_timeout(
        &self,
        mut rx: mpsc::UnboundedReceiver<BandResult>,
        mut stash: Vec<BandResult>,
    ) -> Result<Message, DomainError> {
        if let Some(message) = stash.iter().find_map(|r| r.message.as_ref().filter(|m| m.response_code() == ResponseCode::NoError)) {
            return Ok(message.clone());
        }

        let deadline = tokio::time::Instant::now() + self.overall_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining) => break,
                maybe = rx.recv() => {
                    match maybe {
                        Some(result) => {
                            if is_noerror(&result) {
                                return Ok(result.message.unwrap());
                            }
                            stash.push(result);
                        }
                        None => break,
                    }
                }
            }
        }

        // One last non-blocking poll before giving up.
        if let Ok(result) = rx.try_recv() {
            if is_noerror(&result) {
                return Ok(result.message.unwrap());
            }
            stash.push(result);
        }

        // First received non-NOERROR wins, per the design note's
        // explicit tie-break.
        for result in stash {
            if let Some(message) = result.message {
                return Ok(message);
            }
        }
        Err(DomainError::QueryTimeout)
    }
}

fn is_noerror(result: &BandResult) -> bool {
    result.message.as_ref().map(|m| m.response_code() == ResponseCode::NoError).unwrap_or(false)
}

const STALE_AFTER: Duration = Duration::from_secs(60);
const LOW_SCORE_THRESHOLD: f64 = 0.6;

impl ForwarderDispatcher {
    fn known_addrs(&self) -> Vec<SocketAddr> {
        self.server_states.read().unwrap().keys().copied().collect()
    }

    async fn run_health_probe(&self, addr: SocketAddr) {
        let Ok(query) = crate::dns::forwarding::MessageBuilder::build_query(".", RecordType::NS) else {
            return;
        };
        let state = self.state_for(addr);
        let was_broken = state.read().unwrap().broken;
        let now = Instant::now();

        match exchange::exchange_udp_plain(addr, &query).await {
            Ok(response) => {
                let is_servfail = response.response_code() == ResponseCode::ServFail;
                let mut guard = state.write().unwrap();
                health::apply_probe_observation(&mut guard, is_servfail, now);
                if was_broken && !is_servfail {
                    health::reset_circuit_breaker(&mut guard);
                }
            }
            Err(_) => {
                health::apply_probe_observation(&mut state.write().unwrap(), true, now);
            }
        }
    }
}

#[async_trait]
impl HealthMaintenance for ForwarderDispatcher {
    fn apply_medium_score_drift(&self) {
        let now = Instant::now();
        for state in self.server_states.read().unwrap().values() {
            health::apply_medium_score_drift(&mut state.write().unwrap(), now);
        }
    }

    async fn probe_stale_servers(&self) {
        let now = Instant::now();
        let stale: Vec<SocketAddr> = self
            .known_addrs()
            .into_iter()
            .filter(|addr| {
                let state = self.state_for(*addr);
                let guard = state.read().unwrap();
                !guard.broken && guard.last_query.map(|t| now.duration_since(t) > STALE_AFTER).unwrap_or(true)
            })
            .collect();
        for addr in stale {
            self.run_health_probe(addr).await;
        }
    }

    async fn probe_low_score_servers(&self) {
        let low_score: Vec<SocketAddr> = self
            .known_addrs()
            .into_iter()
            .filter(|addr| {
                let state = self.state_for(*addr);
                let guard = state.read().unwrap();
                !guard.broken && guard.score < LOW_SCORE_THRESHOLD
            })
            .collect();
        for addr in low_score {
            self.run_health_probe(addr).await;
        }
    }

    async fn probe_circuit_broken_servers(&self) {
        let broken: Vec<SocketAddr> = self
            .known_addrs()
            .into_iter()
            .filter(|addr| self.state_for(*addr).read().unwrap().broken)
            .collect();
        for addr in broken {
            self.run_health_probe(addr).await;
        }
    }
}

impl MatchCacheSweeper for ForwarderDispatcher {
    fn sweep_expired(&self) -> usize {
        self.match_cache.sweep_expired()
    }
}

#[async_trait]
impl DnsForwarder for ForwarderDispatcher {
    async fn forward_query(&self, query: &Message) -> Result<Message, DomainError> {
        let qname = Self::qname_of(query).ok_or_else(|| DomainError::MalformedQuery("missing question".into()))?;

        if self.zone_matcher.is_enabled() {
            if let Some(zone) = self.zone_matcher.match_zone(&qname) {
                debug!(zone = %zone, "shadowing forward path with authoritative zone");
                let addr = self.zone_matcher.bind_address();
                let capabilities = self.prober.capabilities(addr);
                let state = self.state_for(addr);
                return exchange::exchange_with_cookie(&self.exchange_ctx, addr, query, capabilities, &state).await;
            }
        }

        let group = self.resolve_group(&qname).ok_or_else(|| DomainError::NoMatchingGroup(qname.clone()))?;
        self.dispatch_group(&group, query).await
    }
}
