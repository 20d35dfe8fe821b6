use ferrous_dns_application::ports::RateLimiterMaintenance;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Drops idle per-IP rate-limit buckets. §4.12/§5.
pub struct RateLimiterCleanupJob {
    rate_limiter: Arc<dyn RateLimiterMaintenance>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl RateLimiterCleanupJob {
    pub fn new(rate_limiter: Arc<dyn RateLimiterMaintenance>) -> Self {
        Self {
            rate_limiter,
            interval_secs: DEFAULT_INTERVAL_SECS,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting rate limiter cleanup job");
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("RateLimiterCleanupJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => self.rate_limiter.cleanup_idle(),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLimiter(AtomicUsize);

    impl RateLimiterMaintenance for CountingLimiter {
        fn cleanup_idle(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_interval() {
        let limiter = Arc::new(CountingLimiter(AtomicUsize::new(0)));
        let job = Arc::new(RateLimiterCleanupJob::new(limiter.clone()).with_interval_secs(600));
        job.start().await;

        tokio::time::advance(Duration::from_secs(1_250)).await;
        tokio::task::yield_now().await;

        assert_eq!(limiter.0.load(Ordering::SeqCst), 2);
    }
}
