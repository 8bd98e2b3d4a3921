//! Hook time budgets seen through the HTTP host.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tokio::time::Instant;

use ska_core::config::{ChainConfig, FailurePolicy};
use ska_plugin::descriptor::PluginManifest;
use ska_plugin::prelude::*;

use crate::helpers::{FAR_FUTURE, TestApp, activity_loader, activity_manifest};

const HOOK_TIMEOUT_MS: u64 = 250;

/// Sleeps for `delay` before handing the request on.
struct PacedFilter {
    delay: Duration,
}

#[async_trait]
impl RequestFilter for PacedFilter {
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError> {
        tokio::time::sleep(self.delay).await;
        Ok(next.run(request).await)
    }
}

/// One pass-through filter ahead of two that each take most of a budget.
struct PacedModule;

#[async_trait]
impl PluginModule for PacedModule {
    fn capabilities(&self) -> Vec<CapabilityDecl> {
        vec![
            CapabilityDecl::filter("outerFilter"),
            CapabilityDecl::filter("firstSlowFilter"),
            CapabilityDecl::filter("secondSlowFilter"),
        ]
    }

    async fn start(&self, _scope: &ModuleScope) -> Result<CapabilitySet, String> {
        let slow = Duration::from_millis(150);
        Ok(CapabilitySet::new()
            .filter("outerFilter", Arc::new(PacedFilter { delay: Duration::ZERO }))
            .filter("firstSlowFilter", Arc::new(PacedFilter { delay: slow }))
            .filter("secondSlowFilter", Arc::new(PacedFilter { delay: slow })))
    }
}

#[tokio::test]
async fn test_slow_downstream_behind_fast_filter_succeeds() {
    let loader = activity_loader();
    loader.register("paced", |_| Ok(Box::new(PacedModule) as Box<dyn PluginModule>));
    let chain = ChainConfig::new(FailurePolicy::FailClosed).with_hook_timeout_ms(HOOK_TIMEOUT_MS);
    let app = TestApp::with_chain(loader, chain);
    app.install(PluginManifest::new("paced", "1.0.0", "paced")).await;

    let started = Instant::now();
    let res = app.request(Method::GET, "/api/activities/1").await;

    // The outer filter waits 300ms downstream, past its own 250ms budget.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["path"], "/api/activities/1");
}

#[tokio::test]
async fn test_stop_over_http_is_not_held_by_registered_filter() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;

    let started = Instant::now();
    let res = app.request(Method::POST, "/api/plugins/activity/stop").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["state"], "STOPPED");
    // Hook timeout is 10s; a stop waiting on its own drain would take that long.
    assert!(started.elapsed() < Duration::from_secs(2));

    let res = app.request(Method::POST, "/api/plugins/activity/unload").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(started.elapsed() < Duration::from_secs(2));
}
