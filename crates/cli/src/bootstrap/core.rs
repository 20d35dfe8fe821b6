use std::sync::Arc;
use std::time::Duration;

use ferrous_dns_application::ports::{
    AuthoritativeZoneMatcher, DnsForwarder, NoAuthoritativeZones,
};
use ferrous_dns_application::HandleDnsQueryUseCase;
use ferrous_dns_domain::config::Config;
use ferrous_dns_infrastructure::dns::{
    CapabilityProber, CookieStore, DomainTrie, ForwarderDispatcher, HandlerPipeline, ResponseCache,
    TcpConnectionPool, TokenBucketRateLimiter,
};
use ferrous_dns_jobs::{
    CapabilityRefreshJob, CookieMaintenanceJob, HealthMaintenanceJob, JobRunner,
    MatchCacheSweepJob, RateLimiterCleanupJob, ResponseCacheSweepJob,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns every long-lived collaborator and the single shutdown token
/// threaded through ingress, the job runner, and the capability prober.
/// Assembly order follows §9: config -> cache -> cookie store ->
/// capability prober (needs the pool) -> TCP pool -> forwarder -> worker
/// pool -> listeners.
pub struct Core {
    config: Config,
    forwarder: Arc<ForwarderDispatcher>,
    cache: Arc<ResponseCache>,
    rate_limiter: Arc<TokenBucketRateLimiter>,
    cookies: Arc<CookieStore>,
    prober: Arc<CapabilityProber>,
    shutdown: CancellationToken,
}

impl Core {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();

        let cache = Arc::new(ResponseCache::new(
            config.dns.cache_size_mb * 1024 * 1024,
            config.dns.cache_error_ttl_secs,
        ));

        let cookies = Arc::new(CookieStore::new());

        let pool = TcpConnectionPool::new();

        let prober = CapabilityProber::spawn(
            pool.clone(),
            config.dns.capability.workers,
            shutdown.clone(),
        );

        let zone_matcher: Arc<dyn AuthoritativeZoneMatcher> = Arc::new(NoAuthoritativeZones);

        let forwarder = Arc::new(ForwarderDispatcher::new(
            DomainTrie::new(),
            pool,
            cookies.clone(),
            zone_matcher,
            prober.clone(),
            Duration::from_millis(config.dns.priority_timeout_ms),
            Duration::from_millis(config.dns.overall_timeout_ms),
        ));
        forwarder.reload_groups(config.forward_groups.clone());

        let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
            config.dns.rate_limit_per_ip,
            config.dns.rate_limit_global,
            Duration::from_secs(config.dns.ban_duration_mins * 60),
        ));

        Ok(Self {
            config,
            forwarder,
            cache,
            rate_limiter,
            cookies,
            prober,
            shutdown,
        })
    }

    /// Starts the background job runner and the DNS ingress listeners,
    /// then blocks until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        self.start_jobs().await;
        self.start_ingress().await?;

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, stopping");
        self.shutdown.cancel();

        // Give in-flight tasks a moment to observe cancellation.
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn start_jobs(&self) {
        let health_check = &self.config.dns.health_check;

        let mut runner = JobRunner::new()
            .with_match_cache_sweep(MatchCacheSweepJob::new(self.forwarder.clone()))
            .with_response_cache_sweep(
                ResponseCacheSweepJob::new(self.cache.clone())
                    .with_interval_secs(self.config.dns.cache_cleanup_interval_secs),
            )
            .with_rate_limiter_cleanup(RateLimiterCleanupJob::new(self.rate_limiter.clone()))
            .with_cookie_maintenance(CookieMaintenanceJob::new(self.cookies.clone()))
            .with_shutdown_token(self.shutdown.clone());

        if health_check.enabled {
            runner = runner.with_health_maintenance(HealthMaintenanceJob::new(self.forwarder.clone()));
        }

        if self.config.dns.capability.enabled {
            runner = runner.with_capability_refresh(
                CapabilityRefreshJob::new(self.prober.clone())
                    .with_interval_secs(self.config.dns.capability.full_refresh_interval_secs),
            );
        }

        runner.start().await;
    }

    async fn start_ingress(&self) -> anyhow::Result<()> {
        let forwarder: Arc<dyn DnsForwarder> = self.forwarder.clone();
        let use_case = HandleDnsQueryUseCase::new(
            self.cache.clone(),
            forwarder,
            self.rate_limiter.clone(),
        );
        let handler = Arc::new(HandlerPipeline::new(
            use_case,
            self.config.dns.message_size_limit,
            self.config.dns.validation_enabled,
        ));

        let addr: std::net::SocketAddr =
            format!("{}:{}", self.config.server.bind_address, self.config.server.dns_port).parse()?;

        let num_listeners = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        ferrous_dns_infrastructure::dns::ingress::run_ingress(
            addr,
            handler,
            num_listeners,
            self.config.dns.client_workers,
            self.config.dns.queue_multiplier,
            self.shutdown.clone(),
        )
        .await?;

        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
