pub mod cache;
pub mod capability;
pub mod cookie;
pub mod events;
pub mod exchange;
pub mod forwarder;
pub mod forwarding;
pub mod handler;
pub mod health;
pub mod ingress;
pub mod rate_limit;
pub mod tcp_pool;
pub mod transport;
pub mod trie;

pub use cache::ResponseCache;
pub use capability::CapabilityProber;
pub use cookie::CookieStore;
pub use events::{QueryEvent, QueryEventEmitter, QueryMetrics};
pub use forwarder::ForwarderDispatcher;
pub use forwarding::MessageBuilder;
pub use handler::HandlerPipeline;
pub use rate_limit::TokenBucketRateLimiter;
pub use tcp_pool::TcpConnectionPool;
pub use trie::{DomainTrie, MatchCache};
