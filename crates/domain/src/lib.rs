//! Ferrous DNS Domain Layer
pub mod config;
pub mod dns_protocol;
pub mod dns_query;
pub mod dns_record;
pub mod dns_request;
pub mod errors;

pub use config::{Config, ForwardGroup};
pub use dns_protocol::DnsProtocol;
pub use dns_query::DnsQuery;
pub use dns_record::{DnsRecord, RecordType};
pub use dns_request::DnsRequest;
pub use errors::DomainError;
