//! Plugin administration handlers.
//!
//! Lifecycle transitions run on their own task so that a client hanging up
//! mid-request never leaves a plugin half-started or half-stopped.

use std::future::Future;

use axum::Json;
use axum::extract::{Path, State};
use tracing::info;

use ska_core::error::AppError;
use ska_plugin::capability::CapabilityKind;
use ska_plugin::descriptor::PluginDescriptor;
use ska_plugin::error::LifecycleError;

use crate::dto::response::{ApiResponse, HookEntry, HooksResponse};
use crate::error::ApiError;
use crate::state::AppState;

type DescriptorResponse = Result<Json<ApiResponse<PluginDescriptor>>, ApiError>;
type DescriptorListResponse = Result<Json<ApiResponse<Vec<PluginDescriptor>>>, ApiError>;

async fn detached<T, F>(operation: &'static str, fut: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::internal(format!("Plugin {operation} task failed: {e}")))?
        .map_err(ApiError::from)
}

/// GET /api/plugins
pub async fn list_plugins(State(state): State<AppState>) -> DescriptorListResponse {
    Ok(Json(ApiResponse::ok(state.plugins.list().await)))
}

/// GET /api/plugins/{id}
pub async fn get_plugin(State(state): State<AppState>, Path(id): Path<String>) -> DescriptorResponse {
    Ok(Json(ApiResponse::ok(state.plugins.get(&id).await?)))
}

/// POST /api/plugins/{id}/start
pub async fn start_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> DescriptorResponse {
    info!(plugin_id = %id, "Admin start requested");
    let plugins = state.plugins.clone();
    let descriptor = detached("start", async move { plugins.start(&id).await }).await?;
    Ok(Json(ApiResponse::ok(descriptor)))
}

/// POST /api/plugins/{id}/stop
pub async fn stop_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> DescriptorResponse {
    info!(plugin_id = %id, "Admin stop requested");
    let plugins = state.plugins.clone();
    let descriptor = detached("stop", async move { plugins.stop(&id).await }).await?;
    Ok(Json(ApiResponse::ok(descriptor)))
}

/// POST /api/plugins/{id}/unload
pub async fn unload_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> DescriptorResponse {
    info!(plugin_id = %id, "Admin unload requested");
    let plugins = state.plugins.clone();
    let descriptor = detached("unload", async move { plugins.unload(&id).await }).await?;
    Ok(Json(ApiResponse::ok(descriptor)))
}

/// POST /api/plugins/reload
pub async fn reload_plugins(State(state): State<AppState>) -> DescriptorListResponse {
    info!("Admin reload of all plugins requested");
    let plugins = state.plugins.clone();
    let descriptors = detached("reload", async move { plugins.reload_all().await }).await?;
    Ok(Json(ApiResponse::ok(descriptors)))
}

/// GET /api/plugins/hooks
pub async fn list_hooks(State(state): State<AppState>) -> Json<ApiResponse<HooksResponse>> {
    let registry = state.plugins.registry();
    let entries = |kind| {
        registry
            .list_by_kind(kind)
            .iter()
            .map(HookEntry::from)
            .collect::<Vec<_>>()
    };

    Json(ApiResponse::ok(HooksResponse {
        registry_id: registry.instance_id(),
        filters: entries(CapabilityKind::Filter),
        interceptors: entries(CapabilityKind::Interceptor),
    }))
}
