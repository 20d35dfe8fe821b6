//! DNS transport layer.
//!
//! Handles raw DNS message delivery over the two wire protocols the
//! forwarder speaks upstream: plain UDP and length-prefixed TCP. Uses enum
//! dispatch instead of trait objects to avoid a vtable indirection per query.

pub mod tcp;
pub mod udp;

use async_trait::async_trait;
use ferrous_dns_domain::{DnsProtocol, DomainError};
use std::time::Duration;

/// Result of a raw DNS transport operation.
#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Vec<u8>,
    pub protocol_used: &'static str,
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<TransportResponse, DomainError>;

    fn protocol_name(&self) -> &'static str;
}

pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
}

impl Transport {
    pub async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<TransportResponse, DomainError> {
        match self {
            Self::Udp(t) => t.send(message_bytes, timeout).await,
            Self::Tcp(t) => t.send(message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
        }
    }
}

pub fn create_transport(protocol: &DnsProtocol) -> Transport {
    match protocol {
        DnsProtocol::Udp { addr } => Transport::Udp(udp::UdpTransport::new(*addr)),
        DnsProtocol::Tcp { addr } => Transport::Tcp(tcp::TcpTransport::new(*addr)),
    }
}
