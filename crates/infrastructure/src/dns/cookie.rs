//! EDNS0 COOKIE (RFC 7873) state: sharded per-upstream cookie store plus
//! wire-level helpers for reading/writing the OPT COOKIE option.

use std::net::SocketAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use ferrous_dns_application::ports::CookieMaintenance;
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};

const SHARD_COUNT: usize = 256;
const ENTRY_TTL: Duration = Duration::from_secs(3600);
const FAILURE_SUPPRESS_WINDOW: Duration = Duration::from_secs(5);
const CLIENT_COOKIE_LEN: usize = 8;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn shard_index(addr: &SocketAddr) -> usize {
    (fnv1a(addr.ip().to_string().as_bytes()) as usize) % SHARD_COUNT
}

#[derive(Debug, Clone)]
pub struct CookieEntry {
    pub client: [u8; CLIENT_COOKIE_LEN],
    pub server: Option<Vec<u8>>,
    pub expires_at: Instant,
}

impl CookieEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct Shard {
    entries: std::collections::HashMap<SocketAddr, CookieEntry>,
    failures: std::collections::HashMap<SocketAddr, Instant>,
}

/// Sharded store of per-upstream EDNS0 cookie state (256 shards, FNV-1a
/// of the upstream address).
pub struct CookieStore {
    shards: Vec<RwLock<Shard>>,
}

impl CookieStore {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(Shard::default())).collect();
        Self { shards }
    }

    fn shard(&self, addr: &SocketAddr) -> &RwLock<Shard> {
        &self.shards[shard_index(addr)]
    }

    /// Returns `(client, server, exists)`. When no live entry is present,
    /// a fresh client cookie is generated but not stored — the caller
    /// stores it via `set` once the exchange completes.
    pub fn get(&self, addr: SocketAddr) -> (Vec<u8>, Option<Vec<u8>>, bool) {
        let now = Instant::now();
        let shard = self.shard(&addr).read().unwrap();
        if let Some(entry) = shard.entries.get(&addr) {
            if !entry.is_expired(now) {
                return (entry.client.to_vec(), entry.server.clone(), true);
            }
        }
        (random_client_cookie().to_vec(), None, false)
    }

    pub fn set(&self, addr: SocketAddr, client: &[u8], server: Option<Vec<u8>>) {
        let mut fixed = [0u8; CLIENT_COOKIE_LEN];
        let n = client.len().min(CLIENT_COOKIE_LEN);
        fixed[..n].copy_from_slice(&client[..n]);

        let mut shard = self.shard(&addr).write().unwrap();
        shard.entries.insert(
            addr,
            CookieEntry {
                client: fixed,
                server,
                expires_at: Instant::now() + ENTRY_TTL,
            },
        );
    }

    /// Generates a new client cookie, clears the server cookie, and
    /// updates expiry. Returns the new client cookie.
    pub fn refresh(&self, addr: SocketAddr) -> [u8; CLIENT_COOKIE_LEN] {
        let client = random_client_cookie();
        let mut shard = self.shard(&addr).write().unwrap();
        shard.entries.insert(
            addr,
            CookieEntry {
                client,
                server: None,
                expires_at: Instant::now() + ENTRY_TTL,
            },
        );
        client
    }

    pub fn record_failure(&self, addr: SocketAddr) {
        let mut shard = self.shard(&addr).write().unwrap();
        shard.failures.insert(addr, Instant::now());
    }

    pub fn is_recently_failed(&self, addr: SocketAddr) -> bool {
        let shard = self.shard(&addr).read().unwrap();
        match shard.failures.get(&addr) {
            Some(at) => at.elapsed() < FAILURE_SUPPRESS_WINDOW,
            None => false,
        }
    }

    /// Purges failure records older than the suppression window. Meant
    /// to be driven by a once-a-minute background sweep.
    pub fn purge_stale_failures(&self) {
        let now = Instant::now();
        for shard_lock in &self.shards {
            let mut shard = shard_lock.write().unwrap();
            shard.failures.retain(|_, at| now.duration_since(*at) < FAILURE_SUPPRESS_WINDOW);
        }
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieMaintenance for CookieStore {
    fn purge_stale_failures(&self) {
        CookieStore::purge_stale_failures(self)
    }
}

fn random_client_cookie() -> [u8; CLIENT_COOKIE_LEN] {
    let mut bytes = [0u8; CLIENT_COOKIE_LEN];
    for b in bytes.iter_mut() {
        *b = fastrand::u8(..);
    }
    bytes
}

/// Builds the COOKIE option payload: 8-byte client, optional 8-32 byte server.
pub fn build_cookie_option(client: &[u8], server: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(CLIENT_COOKIE_LEN + server.map(|s| s.len()).unwrap_or(0));
    out.extend_from_slice(&client[..CLIENT_COOKIE_LEN.min(client.len())]);
    if let Some(server) = server {
        out.extend_from_slice(server);
    }
    out
}

/// Length is valid per RFC 7873: 8 bytes alone, or 16-40 with a server part.
pub fn validate_size(cookie: &[u8]) -> bool {
    cookie.len() == CLIENT_COOKIE_LEN || (16..=40).contains(&cookie.len())
}

/// An echoed cookie carries only the client half — the server's signal
/// that the client should adopt the server cookie sent alongside it.
pub fn is_echoed(cookie: &[u8]) -> bool {
    cookie.len() == CLIENT_COOKIE_LEN
}

pub fn extract_client(cookie: &[u8]) -> Option<&[u8]> {
    if cookie.len() >= CLIENT_COOKIE_LEN {
        Some(&cookie[..CLIENT_COOKIE_LEN])
    } else {
        None
    }
}

pub fn extract_server(cookie: &[u8]) -> Option<&[u8]> {
    if cookie.len() > CLIENT_COOKIE_LEN {
        Some(&cookie[CLIENT_COOKIE_LEN..])
    } else {
        None
    }
}

pub fn has_cookie_option(message: &Message) -> bool {
    message
        .extensions()
        .as_ref()
        .map(|edns| edns.option(EdnsCode::Cookie).is_some())
        .unwrap_or(false)
}

pub fn cookie_bytes(message: &Message) -> Option<Vec<u8>> {
    let edns = message.extensions().as_ref()?;
    match edns.option(EdnsCode::Cookie)? {
        EdnsOption::Unknown(_, bytes) => Some(bytes.clone()),
        _ => None,
    }
}

/// Removes any existing COOKIE option and injects the given one.
pub fn inject_cookie(message: &mut Message, client: &[u8], server: Option<&[u8]>) {
    remove_cookie(message);
    let payload = build_cookie_option(client, server);
    let edns = message.extensions_mut().get_or_insert_with(Default::default);
    edns.set_option(EdnsOption::Unknown(EdnsCode::Cookie.into(), payload));
}

pub fn remove_cookie(message: &mut Message) {
    if let Some(edns) = message.extensions_mut().as_mut() {
        edns.options_mut().remove(EdnsCode::Cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "1.2.3.4:53".parse().unwrap()
    }

    #[test]
    fn get_on_unseen_address_has_no_server_cookie() {
        let store = CookieStore::new();
        let (client, server, exists) = store.get(addr());
        assert_eq!(client.len(), CLIENT_COOKIE_LEN);
        assert!(server.is_none());
        assert!(!exists);
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = CookieStore::new();
        let client = [1u8; 8];
        store.set(addr(), &client, Some(vec![9; 16]));
        let (got_client, got_server, exists) = store.get(addr());
        assert!(exists);
        assert_eq!(got_client, client);
        assert_eq!(got_server, Some(vec![9; 16]));
    }

    #[test]
    fn refresh_clears_server_cookie_and_changes_client() {
        let store = CookieStore::new();
        store.set(addr(), &[1u8; 8], Some(vec![9; 16]));
        let new_client = store.refresh(addr());
        let (got_client, got_server, _) = store.get(addr());
        assert_eq!(got_client, new_client.to_vec());
        assert!(got_server.is_none());
    }

    #[test]
    fn failure_window_expires() {
        let store = CookieStore::new();
        store.record_failure(addr());
        assert!(store.is_recently_failed(addr()));
    }

    #[test]
    fn size_validation_matches_rfc_bounds() {
        assert!(validate_size(&[0u8; 8]));
        assert!(validate_size(&[0u8; 24]));
        assert!(!validate_size(&[0u8; 9]));
        assert!(!validate_size(&[0u8; 41]));
    }

    #[test]
    fn echoed_cookie_is_client_only() {
        assert!(is_echoed(&[0u8; 8]));
        assert!(!is_echoed(&[0u8; 16]));
    }
}
