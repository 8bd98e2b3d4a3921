//! Route definitions for the Ska HTTP API.
//!
//! All routes are mounted under `/api`. The filter chain wraps every route
//! except plugin administration; the interceptor chain wraps the business
//! routes only. Admin requests never run inside a plugin hook, so stopping
//! a plugin cannot wait on the drain permit of its own request.

use axum::{
    Router, middleware as axum_middleware,
    routing::{any, get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let filtered_routes = Router::new()
        .merge(business_routes(state.clone()))
        .merge(health_routes())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::hooks::filter_chain,
        ));

    let api_routes = Router::new()
        .merge(plugin_routes())
        .merge(filtered_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}

/// Plugin administration
fn plugin_routes() -> Router<AppState> {
    Router::new()
        .route("/plugins", get(handlers::plugins::list_plugins))
        .route("/plugins/hooks", get(handlers::plugins::list_hooks))
        .route("/plugins/reload", post(handlers::plugins::reload_plugins))
        .route("/plugins/{id}", get(handlers::plugins::get_plugin))
        .route("/plugins/{id}/start", post(handlers::plugins::start_plugin))
        .route("/plugins/{id}/stop", post(handlers::plugins::stop_plugin))
        .route("/plugins/{id}/unload", post(handlers::plugins::unload_plugin))
}

/// Business routes guarded by the interceptor chain
fn business_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/activities", any(handlers::business::activities))
        .route("/activities/{*rest}", any(handlers::business::activities))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::hooks::interceptor_chain,
        ))
}

/// Health check
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
