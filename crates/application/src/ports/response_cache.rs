use hickory_proto::op::Message;

/// The in-memory response cache keyed on (qname, qtype, qclass). Implemented
/// by `ferrous-dns-infrastructure`'s response cache; exposed as a port so
/// the query-handling use case does not depend on the concrete eviction
/// strategy.
pub trait ResponseCache: Send + Sync {
    /// Looks up a cached response for `query`. The returned message has its
    /// id already set to `query`'s id.
    fn get(&self, query: &Message) -> Option<Message>;

    /// Stores `response` under its question section, deriving TTL from the
    /// answer records (or the configured error TTL for non-success rcodes).
    fn set(&self, response: &Message);

    /// Removes every cached entry whose qname contains `domain` as a
    /// substring (case-insensitive).
    fn delete_by_domain(&self, domain: &str) -> usize;
}
