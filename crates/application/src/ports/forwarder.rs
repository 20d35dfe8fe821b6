use async_trait::async_trait;
use ferrous_dns_domain::DomainError;
use hickory_proto::op::Message;

/// The adaptive upstream-selection engine: group lookup, tiered hedging
/// across priority bands, and capability-aware per-server exchange.
/// Implemented by `ferrous-dns-infrastructure`'s forwarder dispatcher.
#[async_trait]
pub trait DnsForwarder: Send + Sync {
    async fn forward_query(&self, query: &Message) -> Result<Message, DomainError>;
}
