use ferrous_dns_application::ports::CookieMaintenance;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Purges cookie failure-suppression records older than the window. §4.9/§5.
pub struct CookieMaintenanceJob {
    cookies: Arc<dyn CookieMaintenance>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl CookieMaintenanceJob {
    pub fn new(cookies: Arc<dyn CookieMaintenance>) -> Self {
        Self {
            cookies,
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
        info!("Starting cookie maintenance job");
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("CookieMaintenanceJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => self.cookies.purge_stale_failures(),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCookies(AtomicUsize);

    impl CookieMaintenance for CountingCookies {
        fn purge_stale_failures(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_interval() {
        let cookies = Arc::new(CountingCookies(AtomicUsize::new(0)));
        let job = Arc::new(CookieMaintenanceJob::new(cookies.clone()).with_interval_secs(60));
        job.start().await;

        tokio::time::advance(Duration::from_secs(125)).await;
        tokio::task::yield_now().await;

        assert_eq!(cookies.0.load(Ordering::SeqCst), 2);
    }
}
