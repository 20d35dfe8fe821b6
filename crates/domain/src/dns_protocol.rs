use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Transport an upstream DNS server endpoint was reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    /// Plain UDP, port 53 by default.
    Udp { addr: SocketAddr },

    /// DNS over TCP, used for truncated responses and pipelined exchange.
    Tcp { addr: SocketAddr },
}

impl DnsProtocol {
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            DnsProtocol::Udp { addr } | DnsProtocol::Tcp { addr } => *addr,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            DnsProtocol::Udp { .. } => "UDP",
            DnsProtocol::Tcp { .. } => "TCP",
        }
    }

    pub fn as_udp(addr: SocketAddr) -> Self {
        DnsProtocol::Udp { addr }
    }

    pub fn as_tcp(addr: SocketAddr) -> Self {
        DnsProtocol::Tcp { addr }
    }
}

impl FromStr for DnsProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr_str) = s.strip_prefix("udp://") {
            let addr = addr_str
                .parse::<SocketAddr>()
                .map_err(|e| format!("invalid UDP address '{addr_str}': {e}"))?;
            return Ok(DnsProtocol::Udp { addr });
        }

        if let Some(addr_str) = s.strip_prefix("tcp://") {
            let addr = addr_str
                .parse::<SocketAddr>()
                .map_err(|e| format!("invalid TCP address '{addr_str}': {e}"))?;
            return Ok(DnsProtocol::Tcp { addr });
        }

        // Bare "ip:port" defaults to UDP, same as the upstream pool shorthand.
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(DnsProtocol::Udp { addr });
        }

        Err(format!(
            "invalid DNS endpoint '{s}': expected udp://IP:PORT, tcp://IP:PORT, or IP:PORT"
        ))
    }
}

impl fmt::Display for DnsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsProtocol::Udp { addr } => write!(f, "udp://{addr}"),
            DnsProtocol::Tcp { addr } => write!(f, "tcp://{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_with_prefix() {
        let protocol: DnsProtocol = "udp://8.8.8.8:53".parse().unwrap();
        assert!(matches!(protocol, DnsProtocol::Udp { .. }));
    }

    #[test]
    fn parse_bare_address_defaults_to_udp() {
        let protocol: DnsProtocol = "8.8.8.8:53".parse().unwrap();
        assert!(matches!(protocol, DnsProtocol::Udp { .. }));
    }

    #[test]
    fn parse_tcp_with_prefix() {
        let protocol: DnsProtocol = "tcp://1.1.1.1:53".parse().unwrap();
        assert!(matches!(protocol, DnsProtocol::Tcp { .. }));
        assert_eq!(protocol.protocol_name(), "TCP");
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-an-address".parse::<DnsProtocol>().is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let protocol: DnsProtocol = "tcp://9.9.9.9:53".parse().unwrap();
        let rendered = protocol.to_string();
        let reparsed: DnsProtocol = rendered.parse().unwrap();
        assert_eq!(protocol, reparsed);
    }
}
