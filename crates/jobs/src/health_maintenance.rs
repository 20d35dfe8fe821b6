use ferrous_dns_application::ports::HealthMaintenance;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DRIFT_INTERVAL: Duration = Duration::from_secs(10);
const STALE_PROBE_INTERVAL: Duration = Duration::from_secs(60);
const LOW_SCORE_PROBE_INTERVAL: Duration = Duration::from_secs(10);
const CIRCUIT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the four upstream health sub-tasks from §4.9/§5 as independent
/// tickers over the same `HealthMaintenance` port: medium-score drift,
/// stale-server probing, low-score probing, and circuit-broken probing.
pub struct HealthMaintenanceJob {
    health: Arc<dyn HealthMaintenance>,
    shutdown: CancellationToken,
}

impl HealthMaintenanceJob {
    pub fn new(health: Arc<dyn HealthMaintenance>) -> Self {
        Self { health, shutdown: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting health maintenance job");
        self.clone().spawn_drift_task();
        self.clone().spawn_stale_probe_task();
        self.clone().spawn_low_score_probe_task();
        self.clone().spawn_circuit_probe_task();
    }

    fn spawn_drift_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(DRIFT_INTERVAL);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.health.apply_medium_score_drift(),
                }
            }
        });
    }

    fn spawn_stale_probe_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(STALE_PROBE_INTERVAL);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.health.probe_stale_servers().await,
                }
            }
        });
    }

    fn spawn_low_score_probe_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(LOW_SCORE_PROBE_INTERVAL);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.health.probe_low_score_servers().await,
                }
            }
        });
    }

    fn spawn_circuit_probe_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(CIRCUIT_PROBE_INTERVAL);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.health.probe_circuit_broken_servers().await,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHealth {
        drift: AtomicUsize,
        stale: AtomicUsize,
        low_score: AtomicUsize,
        circuit: AtomicUsize,
    }

    #[async_trait]
    impl HealthMaintenance for CountingHealth {
        fn apply_medium_score_drift(&self) {
            self.drift.fetch_add(1, Ordering::SeqCst);
        }
        async fn probe_stale_servers(&self) {
            self.stale.fetch_add(1, Ordering::SeqCst);
        }
        async fn probe_low_score_servers(&self) {
            self.low_score.fetch_add(1, Ordering::SeqCst);
        }
        async fn probe_circuit_broken_servers(&self) {
            self.circuit.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_sub_task_ticks_on_its_own_interval() {
        let health = Arc::new(CountingHealth::default());
        let job = Arc::new(HealthMaintenanceJob::new(health.clone()));
        job.start().await;

        tokio::time::advance(CIRCUIT_PROBE_INTERVAL).await;
        tokio::task::yield_now().await;
        assert_eq!(health.circuit.load(Ordering::SeqCst), 1);
        assert_eq!(health.drift.load(Ordering::SeqCst), 0);

        tokio::time::advance(DRIFT_INTERVAL).await;
        tokio::task::yield_now().await;
        assert!(health.drift.load(Ordering::SeqCst) >= 1);
        assert!(health.low_score.load(Ordering::SeqCst) >= 1);

        tokio::time::advance(STALE_PROBE_INTERVAL).await;
        tokio::task::yield_now().await;
        assert!(health.stale.load(Ordering::SeqCst) >= 1);
    }
}
