use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::dto::ForwardGroupDto;
use crate::errors::ApiError;
use crate::state::AppState;

pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/groups", get(list_groups))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<ForwardGroupDto>>, ApiError> {
    let groups = state.config_source.list_groups().await?;
    Ok(Json(groups.iter().map(ForwardGroupDto::from).collect()))
}
