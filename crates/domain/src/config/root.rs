use serde::{Deserialize, Serialize};

use super::dns::DnsConfig;
use super::forward::{DnsServerEntry, ForwardGroup};
use super::logging::LoggingConfig;
use super::server::ServerConfig;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub server: ServerConfig,

    pub dns: DnsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Static forward groups, read at startup. A real deployment sources
    /// these from the configuration-store collaborator instead; this list
    /// is the in-process fallback used when no such collaborator is wired.
    #[serde(default)]
    pub forward_groups: Vec<ForwardGroup>,
}

impl Config {
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("ferrous-dns.toml").exists() {
            Self::from_file("ferrous-dns.toml")?
        } else if std::path::Path::new("/etc/ferrous-dns/config.toml").exists() {
            Self::from_file("/etc/ferrous-dns/config.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        config.ensure_default_group();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Mirrors the configuration-source collaborator's `ensure_default_group`
    /// contract: group id 1 always exists, built from bare `upstream_servers`
    /// when no forward group was configured explicitly.
    fn ensure_default_group(&mut self) {
        if self.forward_groups.iter().any(|g| g.id == ForwardGroup::DEFAULT_GROUP_ID) {
            return;
        }

        let servers: Vec<DnsServerEntry> = self
            .dns
            .upstream_servers
            .iter()
            .filter_map(|s| parse_server(s))
            .collect();

        self.forward_groups
            .insert(0, ForwardGroup::default_group(servers));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        if !self
            .forward_groups
            .iter()
            .any(|g| g.id == ForwardGroup::DEFAULT_GROUP_ID)
        {
            return Err(ConfigError::Validation(
                "default forward group (id=1) is missing".to_string(),
            ));
        }

        if self.forward_groups.iter().all(|g| g.is_empty()) {
            return Err(ConfigError::Validation(
                "no upstream servers configured in any forward group".to_string(),
            ));
        }

        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let existing = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        let mut doc = existing
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| ConfigError::Parse(format!("failed to parse config file: {e}")))?;

        // Updates a scalar value while preserving any inline comment on that line.
        fn set_val(table: &mut toml_edit::Table, key: &str, new_val: toml_edit::Value) {
            match table.get_mut(key) {
                Some(item @ toml_edit::Item::Value(_)) => {
                    let suffix = item.as_value().and_then(|v| v.decor().suffix()).cloned();
                    *item = toml_edit::Item::Value(new_val);
                    if let (Some(s), Some(v)) = (suffix, item.as_value_mut()) {
                        v.decor_mut().set_suffix(s);
                    }
                }
                Some(item) => *item = toml_edit::Item::Value(new_val),
                None => {
                    table.insert(key, toml_edit::Item::Value(new_val));
                }
            }
        }

        if let Some(t) = doc.get_mut("server").and_then(|i| i.as_table_mut()) {
            set_val(t, "dns_port", toml_edit::Value::from(self.server.dns_port as i64));
            set_val(t, "bind_address", toml_edit::Value::from(self.server.bind_address.clone()));
        }

        if let Some(t) = doc.get_mut("dns").and_then(|i| i.as_table_mut()) {
            set_val(t, "query_timeout_secs", toml_edit::Value::from(self.dns.query_timeout_secs as i64));
            set_val(t, "client_workers", toml_edit::Value::from(self.dns.client_workers as i64));
            set_val(t, "queue_multiplier", toml_edit::Value::from(self.dns.queue_multiplier as i64));
            set_val(t, "priority_timeout_ms", toml_edit::Value::from(self.dns.priority_timeout_ms as i64));
            set_val(t, "overall_timeout_ms", toml_edit::Value::from(self.dns.overall_timeout_ms as i64));
            set_val(t, "cache_size_mb", toml_edit::Value::from(self.dns.cache_size_mb as i64));
            set_val(
                t,
                "cache_cleanup_interval_secs",
                toml_edit::Value::from(self.dns.cache_cleanup_interval_secs as i64),
            );
            set_val(t, "cache_error_ttl_secs", toml_edit::Value::from(self.dns.cache_error_ttl_secs as i64));
            set_val(t, "rate_limit_per_ip", toml_edit::Value::from(self.dns.rate_limit_per_ip as i64));
            set_val(t, "rate_limit_global", toml_edit::Value::from(self.dns.rate_limit_global as i64));
            set_val(t, "ban_duration_mins", toml_edit::Value::from(self.dns.ban_duration_mins as i64));
            set_val(t, "message_size_limit", toml_edit::Value::from(self.dns.message_size_limit as i64));
            set_val(t, "validation_enabled", toml_edit::Value::from(self.dns.validation_enabled));
        }

        if let Some(t) = doc.get_mut("logging").and_then(|i| i.as_table_mut()) {
            set_val(t, "level", toml_edit::Value::from(self.logging.level.clone()));
        }

        std::fs::write(path, doc.to_string())
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }

    pub fn get_config_path() -> Option<String> {
        if std::path::Path::new("ferrous-dns.toml").exists() {
            Some("ferrous-dns.toml".to_string())
        } else if std::path::Path::new("/etc/ferrous-dns/config.toml").exists() {
            Some("/etc/ferrous-dns/config.toml".to_string())
        } else {
            None
        }
    }
}

fn parse_server(s: &str) -> Option<DnsServerEntry> {
    let addr: std::net::SocketAddr = s.parse().ok()?;
    Some(DnsServerEntry {
        address: addr.ip(),
        port: addr.port(),
        queue_index: 0,
        description: String::new(),
    })
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    FileRead(String, String),
    #[error("failed to write config file {0}: {1}")]
    FileWrite(String, String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        let mut config = config;
        config.ensure_default_group();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_port_zero() {
        let mut config = Config::default();
        config.ensure_default_group();
        config.server.dns_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ensure_default_group_is_idempotent() {
        let mut config = Config::default();
        config.ensure_default_group();
        let count_before = config.forward_groups.len();
        config.ensure_default_group();
        assert_eq!(count_before, config.forward_groups.len());
    }
}
