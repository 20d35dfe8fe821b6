use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No forward group matches domain: {0}")]
    NoMatchingGroup(String),

    #[error("Upstream group '{0}' has no configured servers")]
    EmptyGroup(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Circuit open for server: {0}")]
    CircuitOpen(String),

    #[error("Response cache is over its byte budget")]
    CacheOverBudget,

    #[error("Invalid EDNS0 cookie: {0}")]
    InvalidCookie(String),

    #[error("Connection pool exhausted for server: {0}")]
    PoolExhausted(String),

    #[error("Rate limit exceeded for client: {0}")]
    RateLimited(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
