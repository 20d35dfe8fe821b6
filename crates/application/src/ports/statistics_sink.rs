use async_trait::async_trait;
use ferrous_dns_domain::DomainError;

/// QPS sample produced by the core at a fixed cadence.
#[derive(Debug, Clone, Copy)]
pub struct QpsSample {
    pub timestamp_unix: i64,
    pub queries_per_second: f64,
    pub cache_hit_rate: f64,
}

/// CPU/memory/disk percent sample.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub timestamp_unix: i64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
}

/// Network byte counters sample.
#[derive(Debug, Clone, Copy)]
pub struct NetworkSample {
    pub timestamp_unix: i64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// The operational metrics exporter collaborator. The core only produces
/// samples; the sink is responsible for persisting and exposing them.
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    async fn record_qps(&self, sample: QpsSample) -> Result<(), DomainError>;
    async fn record_resource(&self, sample: ResourceSample) -> Result<(), DomainError>;
    async fn record_network(&self, sample: NetworkSample) -> Result<(), DomainError>;
}

/// Sink that discards every sample; used when no metrics exporter is wired.
pub struct NullStatisticsSink;

#[async_trait]
impl StatisticsSink for NullStatisticsSink {
    async fn record_qps(&self, _sample: QpsSample) -> Result<(), DomainError> {
        Ok(())
    }

    async fn record_resource(&self, _sample: ResourceSample) -> Result<(), DomainError> {
        Ok(())
    }

    async fn record_network(&self, _sample: NetworkSample) -> Result<(), DomainError> {
        Ok(())
    }
}
