use ferrous_dns_application::ports::CacheSweeper;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Drops expired entries from the response cache. §5, `DNS_CACHE_CLEANUP_INTERVAL`.
pub struct ResponseCacheSweepJob {
    sweeper: Arc<dyn CacheSweeper>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl ResponseCacheSweepJob {
    pub fn new(sweeper: Arc<dyn CacheSweeper>) -> Self {
        Self {
            sweeper,
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
        info!("Starting response cache sweep job");
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("ResponseCacheSweepJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = self.sweeper.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "response cache sweep removed expired entries");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSweeper(AtomicUsize);

    impl CacheSweeper for CountingSweeper {
        fn sweep_expired(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_interval() {
        let sweeper = Arc::new(CountingSweeper(AtomicUsize::new(0)));
        let job = Arc::new(ResponseCacheSweepJob::new(sweeper.clone()).with_interval_secs(60));
        job.start().await;

        tokio::time::advance(Duration::from_secs(125)).await;
        tokio::task::yield_now().await;

        assert_eq!(sweeper.0.load(Ordering::SeqCst), 2);
    }
}
