//! Ska Server: plugin host.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use ska_core::config::AppConfig;
use ska_core::error::AppError;
use ska_plugin::discovery::DirectoryArchiveSource;
use ska_plugin::manager::PluginManager;
use ska_plugin::module::{ModuleLoader, StaticModuleLoader};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    if let Ok(path) = std::env::var("SKA_CONFIG") {
        return AppConfig::load_file(&path);
    }
    let env = std::env::var("SKA_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Module loader with every compiled-in plugin registered.
fn module_loader() -> Arc<dyn ModuleLoader> {
    let loader = StaticModuleLoader::new();
    plugin_activity::register(&loader);
    let loader: Arc<dyn ModuleLoader> = Arc::new(loader);

    #[cfg(feature = "dynamic")]
    let loader: Arc<dyn ModuleLoader> = Arc::new(
        ska_plugin::module::dynamic::DynamicModuleLoader::new().with_fallback(loader),
    );

    loader
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        filter_policy = %config.chains.filter.failure_policy,
        interceptor_policy = %config.chains.interceptor.failure_policy,
        "Starting Ska server"
    );

    let source = DirectoryArchiveSource::new(&config.plugins.directory);
    let plugins = Arc::new(
        PluginManager::new(module_loader(), config.plugins.clone())
            .with_archive_source(Arc::new(source)),
    );

    let descriptors = plugins.bootstrap().await?;
    tracing::info!(count = descriptors.len(), "Plugins bootstrapped");

    ska_api::run_server(config, plugins).await
}
