//! Thin admin-API skeleton: DTOs and an `axum` router proving the
//! `ConfigSource`/`StatisticsSink` port contracts are implementable over
//! HTTP. Full CRUD/auth handlers are out of core scope (spec §1).

pub mod dto;
pub mod errors;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use routes::create_api_routes;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ferrous_dns_application::ports::ConfigSource;
    use ferrous_dns_domain::config::ForwardGroup;
    use ferrous_dns_domain::DomainError;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticGroups;

    #[async_trait]
    impl ConfigSource for StaticGroups {
        async fn list_groups(&self) -> Result<Vec<ForwardGroup>, DomainError> {
            Ok(vec![ForwardGroup::default_group(vec![])])
        }

        async fn ensure_default_group(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn cleanup_runtime_states(&self, _active: &[SocketAddr]) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn health_route_responds_ok() {
        let app = create_api_routes(AppState::new(Arc::new(StaticGroups)));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn groups_route_reflects_config_source() {
        let app = create_api_routes(AppState::new(Arc::new(StaticGroups)));
        let response = app
            .oneshot(Request::builder().uri("/api/groups").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
