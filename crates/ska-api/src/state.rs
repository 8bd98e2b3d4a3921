//! Shared application state passed to every handler and middleware.

use std::sync::Arc;
use std::time::Instant;

use ska_core::config::AppConfig;
use ska_plugin::hooks::{FilterChain, InterceptorChain};
use ska_plugin::manager::PluginManager;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Plugin lifecycle manager.
    pub plugins: Arc<PluginManager>,
    /// Filter chain run around every request.
    pub filters: Arc<FilterChain>,
    /// Interceptor chain run around the business routes.
    pub interceptors: Arc<InterceptorChain>,
    /// When the host started serving.
    pub started_at: Instant,
}

impl AppState {
    /// Builds both chains over the manager's registry.
    pub fn new(config: AppConfig, plugins: Arc<PluginManager>) -> Self {
        let registry = Arc::clone(plugins.registry());
        let filters = FilterChain::new(Arc::clone(&registry), config.chains.filter.clone());
        let interceptors = InterceptorChain::new(registry, config.chains.interceptor.clone());
        Self {
            config: Arc::new(config),
            plugins,
            filters: Arc::new(filters),
            interceptors: Arc::new(interceptors),
            started_at: Instant::now(),
        }
    }
}
