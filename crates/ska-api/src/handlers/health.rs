//! Health check handler.

use axum::Json;
use axum::extract::State;

use ska_plugin::descriptor::PluginState;

use crate::dto::response::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let plugins_started = state
        .plugins
        .list()
        .await
        .iter()
        .filter(|p| p.state == PluginState::Started)
        .count();

    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        plugins_started,
    }))
}
