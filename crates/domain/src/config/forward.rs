use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// An upstream DNS server inside a forward group, keyed within its priority
/// band by (address, port).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DnsServerEntry {
    pub address: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub queue_index: u32,

    #[serde(default)]
    pub description: String,
}

impl DnsServerEntry {
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.address, self.port)
    }
}

fn default_port() -> u16 {
    53
}

/// A named domain-to-upstream mapping. Group id 1 is the default group and
/// always matches when no trie suffix does; its domain is fixed to "Default".
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardGroup {
    pub id: u32,

    pub domain: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// priority in {1,2,3} -> ordered servers at that priority
    #[serde(default)]
    pub servers: BTreeMap<u8, Vec<DnsServerEntry>>,
}

impl ForwardGroup {
    pub const DEFAULT_GROUP_ID: u32 = 1;
    pub const DEFAULT_GROUP_DOMAIN: &'static str = "Default";

    pub fn default_group(servers: Vec<DnsServerEntry>) -> Self {
        let mut by_priority = BTreeMap::new();
        by_priority.insert(1u8, servers);
        Self {
            id: Self::DEFAULT_GROUP_ID,
            domain: Self::DEFAULT_GROUP_DOMAIN.to_string(),
            description: "Default forwarding group".to_string(),
            enabled: true,
            servers: by_priority,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.values().all(|v| v.is_empty())
    }

    /// All servers across every priority band, in priority order.
    pub fn all_servers(&self) -> impl Iterator<Item = (u8, &DnsServerEntry)> {
        self.servers
            .iter()
            .flat_map(|(priority, servers)| servers.iter().map(move |s| (*priority, s)))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_group_has_fixed_id_and_domain() {
        let group = ForwardGroup::default_group(vec![]);
        assert_eq!(group.id, ForwardGroup::DEFAULT_GROUP_ID);
        assert_eq!(group.domain, "Default");
    }

    #[test]
    fn empty_when_every_priority_band_is_empty() {
        let group = ForwardGroup::default_group(vec![]);
        assert!(group.is_empty());
    }
}
