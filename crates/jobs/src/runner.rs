use crate::{
    CapabilityRefreshJob, CookieMaintenanceJob, HealthMaintenanceJob, MatchCacheSweepJob,
    RateLimiterCleanupJob, ResponseCacheSweepJob,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregates and starts every background maintenance job with a shared
/// shutdown token. Jobs are optional so a deployment can omit a
/// collaborator it doesn't have (e.g. no capability prober configured).
pub struct JobRunner {
    match_cache_sweep: Option<MatchCacheSweepJob>,
    response_cache_sweep: Option<ResponseCacheSweepJob>,
    health_maintenance: Option<HealthMaintenanceJob>,
    capability_refresh: Option<CapabilityRefreshJob>,
    cookie_maintenance: Option<CookieMaintenanceJob>,
    rate_limiter_cleanup: Option<RateLimiterCleanupJob>,
    shutdown: Option<CancellationToken>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            match_cache_sweep: None,
            response_cache_sweep: None,
            health_maintenance: None,
            capability_refresh: None,
            cookie_maintenance: None,
            rate_limiter_cleanup: None,
            shutdown: None,
        }
    }

    pub fn with_match_cache_sweep(mut self, job: MatchCacheSweepJob) -> Self {
        self.match_cache_sweep = Some(job);
        self
    }

    pub fn with_response_cache_sweep(mut self, job: ResponseCacheSweepJob) -> Self {
        self.response_cache_sweep = Some(job);
        self
    }

    pub fn with_health_maintenance(mut self, job: HealthMaintenanceJob) -> Self {
        self.health_maintenance = Some(job);
        self
    }

    pub fn with_capability_refresh(mut self, job: CapabilityRefreshJob) -> Self {
        self.capability_refresh = Some(job);
        self
    }

    pub fn with_cookie_maintenance(mut self, job: CookieMaintenanceJob) -> Self {
        self.cookie_maintenance = Some(job);
        self
    }

    pub fn with_rate_limiter_cleanup(mut self, job: RateLimiterCleanupJob) -> Self {
        self.rate_limiter_cleanup = Some(job);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub async fn start(self) {
        info!("Starting background job runner");

        if let Some(job) = self.match_cache_sweep {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.response_cache_sweep {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.health_maintenance {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.capability_refresh {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.cookie_maintenance {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.rate_limiter_cleanup {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        info!("All background jobs started");
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
