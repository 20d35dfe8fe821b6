//! Thin Pi-hole-compatible API skeleton: a DTO shape matching Pi-hole's
//! `/api/stats/summary` and a router proving `StatisticsSink` samples can
//! be exposed in that shape. Full admin functionality is out of core
//! scope (spec §1); this crate exists so the contract compiles and is
//! exercised by a smoke test, not as a feature surface.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use ferrous_dns_application::ports::StatisticsSink;

#[derive(Clone)]
pub struct PiholeState {
    pub sink: Arc<dyn StatisticsSink>,
}

#[derive(Debug, Serialize)]
pub struct SummaryDto {
    pub queries_per_second: f64,
    pub cache_hit_rate: f64,
}

pub fn create_pihole_routes(state: PiholeState) -> Router {
    Router::new().route("/api/stats/summary", get(summary)).with_state(state)
}

async fn summary(State(_state): State<PiholeState>) -> Json<SummaryDto> {
    // No time-series store is wired in this skeleton; a real deployment
    // feeds this from the same samples handed to `StatisticsSink`.
    Json(SummaryDto { queries_per_second: 0.0, cache_hit_rate: 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ferrous_dns_application::ports::{NetworkSample, QpsSample, ResourceSample};
    use ferrous_dns_domain::DomainError;
    use tower::ServiceExt;

    struct NullSink;

    #[async_trait]
    impl StatisticsSink for NullSink {
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

    #[tokio::test]
    async fn summary_route_responds_ok() {
        let app = create_pihole_routes(PiholeState { sink: Arc::new(NullSink) });
        let response = app
            .oneshot(Request::builder().uri("/api/stats/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
