//! Activity plugin module: produces the expiry filter, the interceptor, and
//! optionally the request-logging filter.

use std::sync::Arc;

use tracing::info;

use ska_plugin::descriptor::PluginManifest;
use ska_plugin::module::StaticModuleLoader;
use ska_plugin_sdk::prelude::*;

use crate::hooks::{
    ActivityExpiryFilter, ActivityInterceptor, EXPIRY_FILTER, INTERCEPTOR, REQUEST_LOG_FILTER,
    RequestLogFilter,
};
use crate::properties::ActivityProperties;

/// Manifest `entry` this module is registered under.
pub const ENTRY: &str = "activity";
/// Stamped on activity requests by the interceptor.
pub const PLUGIN_NAME: &str = "activity-plugin";
/// Stamped on activity requests by the interceptor.
pub const PLUGIN_VERSION: &str = "1.0.0";

/// The activity plugin's entry point.
#[derive(Debug, Default)]
pub struct ActivityModule {
    request_log: bool,
}

impl ActivityModule {
    /// Module with the expiry filter and the interceptor only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also produce the request-logging filter.
    pub fn with_request_log(mut self, enabled: bool) -> Self {
        self.request_log = enabled;
        self
    }

    /// Builds the module a manifest asks for.
    pub fn from_manifest(manifest: &PluginManifest) -> Self {
        let request_log = manifest
            .properties
            .get("request_log")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Self::new().with_request_log(request_log)
    }
}

#[async_trait]
impl PluginModule for ActivityModule {
    fn capabilities(&self) -> Vec<CapabilityDecl> {
        let mut declared = vec![
            CapabilityDecl::filter(EXPIRY_FILTER),
            CapabilityDecl::interceptor(INTERCEPTOR),
        ];
        if self.request_log {
            declared.push(CapabilityDecl::filter(REQUEST_LOG_FILTER));
        }
        declared
    }

    async fn start(&self, scope: &ModuleScope) -> Result<CapabilitySet, String> {
        let properties = Arc::new(ActivityProperties::from_scope(scope));
        info!(
            plugin_id = %scope.plugin_id,
            module = %scope.module_id,
            expire_time = properties.expire_time_display(),
            path_prefix = %properties.path_prefix,
            "Activity plugin starting"
        );

        let mut set = CapabilitySet::new()
            .filter(
                EXPIRY_FILTER,
                Arc::new(ActivityExpiryFilter::new(Arc::clone(&properties))),
            )
            .interceptor(
                INTERCEPTOR,
                Arc::new(ActivityInterceptor::new(Arc::clone(&properties))),
            );
        if self.request_log {
            set = set.filter(REQUEST_LOG_FILTER, Arc::new(RequestLogFilter::new()));
        }
        Ok(set)
    }

    async fn stop(&self) -> Result<(), String> {
        info!("Activity plugin stopped");
        Ok(())
    }
}

/// Makes the activity module available to `loader` under [`ENTRY`].
pub fn register(loader: &StaticModuleLoader) {
    loader.register(ENTRY, |manifest: &PluginManifest| {
        Ok(Box::new(ActivityModule::from_manifest(manifest)) as Box<dyn PluginModule>)
    });
}
