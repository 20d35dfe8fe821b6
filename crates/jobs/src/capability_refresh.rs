use ferrous_dns_application::ports::CapabilityMaintenance;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Re-enqueues every known upstream for capability re-probing. §4.9.
pub struct CapabilityRefreshJob {
    capability: Arc<dyn CapabilityMaintenance>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl CapabilityRefreshJob {
    pub fn new(capability: Arc<dyn CapabilityMaintenance>) -> Self {
        Self {
            capability,
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
        info!("Starting capability refresh job");
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("CapabilityRefreshJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => self.capability.full_refresh(),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCapability(AtomicUsize);

    impl CapabilityMaintenance for CountingCapability {
        fn full_refresh(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_interval() {
        let capability = Arc::new(CountingCapability(AtomicUsize::new(0)));
        let job = Arc::new(CapabilityRefreshJob::new(capability.clone()).with_interval_secs(300));
        job.start().await;

        tokio::time::advance(Duration::from_secs(620)).await;
        tokio::task::yield_now().await;

        assert_eq!(capability.0.load(Ordering::SeqCst), 2);
    }
}
