//! Port-facing DTOs for the admin HTTP API. Full CRUD/auth handlers are
//! out of scope (see spec §1); these types exist so the contract between
//! the forwarder core and an external admin API is concrete and testable.

use ferrous_dns_domain::config::ForwardGroup;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardGroupDto {
    pub id: u32,
    pub domain: String,
    pub enabled: bool,
    pub server_count: usize,
}

impl From<&ForwardGroup> for ForwardGroupDto {
    fn from(group: &ForwardGroup) -> Self {
        Self {
            id: group.id,
            domain: group.domain.clone(),
            enabled: group.enabled,
            server_count: group.all_servers().count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QpsSampleDto {
    pub timestamp_unix: i64,
    pub queries_per_second: f64,
    pub cache_hit_rate: f64,
}
