use async_trait::async_trait;
use ferrous_dns_domain::config::ForwardGroup;
use ferrous_dns_domain::DomainError;
use std::net::SocketAddr;

/// The persistent configuration store (upstream groups, users) collaborator.
/// Out of core scope per the forwarder's purpose & scope — this crate only
/// consumes the contract; the store itself lives in an external component.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<ForwardGroup>, DomainError>;

    /// Creates the id=1 default group if the store does not already have one.
    async fn ensure_default_group(&self) -> Result<(), DomainError>;

    /// Invoked after a reload so the collaborator can prune any runtime
    /// state (e.g. health/cookie records) for servers no longer referenced
    /// by any active group.
    async fn cleanup_runtime_states(&self, active_servers: &[SocketAddr]) -> Result<(), DomainError>;
}
