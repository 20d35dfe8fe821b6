use std::net::SocketAddr;

/// Optional collaborator that may shadow the forwarding path for a domain,
/// e.g. an authoritative BIND instance serving a local zone. When enabled
/// and matched, dispatch shortcuts to `bind_address` with no fallback.
pub trait AuthoritativeZoneMatcher: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Returns the matched zone apex when `qname` falls under an
    /// authoritative zone, `None` otherwise.
    fn match_zone(&self, qname: &str) -> Option<String>;

    fn bind_address(&self) -> SocketAddr;
}

/// No-op matcher used when no authoritative-zone collaborator is wired.
pub struct NoAuthoritativeZones;

impl AuthoritativeZoneMatcher for NoAuthoritativeZones {
    fn is_enabled(&self) -> bool {
        false
    }

    fn match_zone(&self, _qname: &str) -> Option<String> {
        None
    }

    fn bind_address(&self) -> SocketAddr {
        ([0, 0, 0, 0], 0).into()
    }
}
