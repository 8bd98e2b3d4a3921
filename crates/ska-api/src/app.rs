//! Application builder: wires router, middleware and state into an Axum
//! app, and runs it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use ska_core::config::AppConfig;
use ska_core::error::{AppError, ErrorKind};
use ska_plugin::manager::PluginManager;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application over an already bootstrapped
/// plugin manager.
pub fn build_app(config: AppConfig, plugins: Arc<PluginManager>) -> Router {
    build_router(AppState::new(config, plugins))
}

/// Serves HTTP until Ctrl+C, then stops and unloads every plugin.
pub async fn run_server(config: AppConfig, plugins: Arc<PluginManager>) -> Result<(), AppError> {
    let addr = config.server.bind_address();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let app = build_app(config, Arc::clone(&plugins));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Io, format!("Failed to bind {addr}: {e}"), e)
        })?;

    tracing::info!(address = %addr, "Ska server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::with_source(ErrorKind::Io, format!("Server error: {e}"), e))?;

    tracing::info!("HTTP server stopped, shutting down plugins");
    if tokio::time::timeout(grace, plugins.shutdown()).await.is_err() {
        tracing::warn!(
            grace_seconds = grace.as_secs(),
            "Plugin shutdown did not finish within the grace period"
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
