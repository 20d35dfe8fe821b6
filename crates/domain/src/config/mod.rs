mod dns;
mod forward;
mod logging;
mod root;
mod server;

pub use dns::{CapabilityProbeConfig, DnsConfig, HealthCheckConfig, TcpPoolConfig};
pub use forward::{DnsServerEntry, ForwardGroup};
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config, ConfigError};
pub use server::ServerConfig;
