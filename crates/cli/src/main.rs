mod bootstrap;

use bootstrap::Core;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use ferrous_dns_domain::config::{CliOverrides, Config};
use tracing::info;

#[derive(Parser)]
#[command(name = "ferrous-dns")]
#[command(version)]
#[command(about = "Adaptive caching DNS forwarder")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS listener port
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        dns_port: cli.dns_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = Config::load(cli.config.as_deref(), overrides)?;

    let log_level = config.logging.level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_ansi(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting ferrous-dns");
    info!(
        bind = %config.server.bind_address,
        port = config.server.dns_port,
        groups = config.forward_groups.len(),
        "configuration loaded"
    );

    let core = Core::new(config)?;
    core.run().await?;

    info!("ferrous-dns stopped");
    Ok(())
}
