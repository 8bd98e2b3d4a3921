//! Shared test helpers for integration tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

use ska_api::middleware::hooks::HookAttributes;
use ska_core::config::{
    AppConfig, ChainConfig, ChainsConfig, FailurePolicy, LoggingConfig, PluginConfig,
    ServerConfig,
};
use ska_plugin::descriptor::{ArchiveRef, PluginManifest};
use ska_plugin::manager::PluginManager;
use ska_plugin::module::StaticModuleLoader;

/// An expiry far enough away to never trigger.
pub const FAR_FUTURE: &str = "2099-12-31 23:59:59";
/// An expiry that has already passed.
pub const LONG_AGO: &str = "2000-01-01 00:00:00";

/// Test application wrapper
pub struct TestApp {
    pub router: Router,
    pub plugins: Arc<PluginManager>,
}

/// Response snapshot: status, JSON body and the hook attributes the chains
/// left on the response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub attributes: HookAttributes,
}

impl TestApp {
    /// Host with the activity plugin registered and nothing loaded.
    pub fn new() -> Self {
        Self::with_loader(activity_loader(), FailurePolicy::FailClosed)
    }

    /// Host over `loader`, with both chains using `policy`.
    pub fn with_loader(loader: StaticModuleLoader, policy: FailurePolicy) -> Self {
        Self::with_chain(loader, ChainConfig::new(policy).with_hook_timeout_ms(10_000))
    }

    /// Host over `loader`, with both chains using `chain`.
    pub fn with_chain(loader: StaticModuleLoader, chain: ChainConfig) -> Self {
        let config = test_config(chain);
        let plugins = Arc::new(PluginManager::new(
            Arc::new(loader),
            config.plugins.clone(),
        ));
        let router = ska_api::build_app(config, Arc::clone(&plugins));
        Self { router, plugins }
    }

    /// Loads and starts a plugin from an in-memory manifest.
    pub async fn install(&self, manifest: PluginManifest) -> String {
        let plugin_id = self
            .plugins
            .load(ArchiveRef::in_memory(manifest))
            .await
            .unwrap();
        self.plugins.start(&plugin_id).await.unwrap();
        plugin_id
    }

    /// Send a request and return the raw response.
    pub async fn send(&self, method: Method, path: &str) -> Response {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Send a request and collect its status, body and hook attributes.
    pub async fn request(&self, method: Method, path: &str) -> TestResponse {
        let mut response = self.send(method, path).await;
        let status = response.status();
        let attributes = response
            .extensions_mut()
            .remove::<HookAttributes>()
            .unwrap_or_default();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            body,
            attributes,
        }
    }
}

/// Loader with the activity plugin registered.
pub fn activity_loader() -> StaticModuleLoader {
    let loader = StaticModuleLoader::new();
    plugin_activity::register(&loader);
    loader
}

/// Manifest for the activity plugin expiring at `expire_time`.
pub fn activity_manifest(expire_time: &str) -> PluginManifest {
    PluginManifest::new("activity", "1.0.0", plugin_activity::ENTRY)
        .with_description("Activity expiry checks")
        .with_property("expire_time", expire_time)
}

/// Configuration built in code so tests never read `config/`.
pub fn test_config(chain: ChainConfig) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        plugins: PluginConfig {
            auto_start: false,
            drain_warn_after_ms: 200,
            ..PluginConfig::default()
        },
        chains: ChainsConfig {
            filter: chain.clone(),
            interceptor: chain,
        },
        logging: LoggingConfig::default(),
    }
}
