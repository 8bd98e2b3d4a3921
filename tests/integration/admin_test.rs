//! Plugin admin API tests.

use axum::http::{Method, StatusCode};
use ska_core::config::FailurePolicy;
use ska_plugin::descriptor::PluginManifest;
use ska_plugin::prelude::*;

use crate::helpers::{FAR_FUTURE, TestApp, activity_loader, activity_manifest};

/// Module whose entry point always fails.
struct BrokenModule;

#[async_trait]
impl PluginModule for BrokenModule {
    fn capabilities(&self) -> Vec<CapabilityDecl> {
        vec![CapabilityDecl::filter("brokenFilter")]
    }

    async fn start(&self, _scope: &ModuleScope) -> Result<CapabilitySet, String> {
        Err("entry point exploded".to_string())
    }
}

fn app_with_broken_plugin() -> TestApp {
    let loader = activity_loader();
    loader.register("broken", |_| Ok(Box::new(BrokenModule) as Box<dyn PluginModule>));
    TestApp::with_loader(loader, FailurePolicy::FailClosed)
}

#[tokio::test]
async fn test_list_and_get_plugins() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;

    let res = app.request(Method::GET, "/api/plugins").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    let plugins = res.body["data"].as_array().unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0]["pluginId"], "activity");
    assert_eq!(plugins[0]["state"], "STARTED");

    let res = app.request(Method::GET, "/api/plugins/activity").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["description"], "Activity expiry checks");
    assert!(res.body["data"]["moduleId"].is_u64());
}

#[tokio::test]
async fn test_unknown_plugin_is_not_found() {
    let app = TestApp::new();

    let res = app.request(Method::GET, "/api/plugins/ghost").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "NOT_FOUND");

    let res = app.request(Method::POST, "/api/plugins/ghost/start").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;

    let first = app.request(Method::POST, "/api/plugins/activity/start").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["data"]["state"], "STARTED");

    let hooks = app.request(Method::GET, "/api/plugins/hooks").await;
    assert_eq!(hooks.body["data"]["filters"].as_array().unwrap().len(), 1);
    assert_eq!(hooks.body["data"]["interceptors"].as_array().unwrap().len(), 1);

    for _ in 0..2 {
        let res = app.request(Method::POST, "/api/plugins/activity/stop").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["data"]["state"], "STOPPED");
    }

    let hooks = app.request(Method::GET, "/api/plugins/hooks").await;
    assert!(hooks.body["data"]["filters"].as_array().unwrap().is_empty());
    assert!(hooks.body["data"]["interceptors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_hooks_endpoint_reports_registration_order() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE).with_property("request_log", "true"))
        .await;

    let res = app.request(Method::GET, "/api/plugins/hooks").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(!res.body["data"]["registryId"].as_str().unwrap().is_empty());

    let filters = res.body["data"]["filters"].as_array().unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0]["key"], "activity:activityExpiryFilter");
    assert_eq!(filters[1]["key"], "activity:activityRequestLogFilter");
    assert!(filters[0]["sequence"].as_u64() < filters[1]["sequence"].as_u64());
    assert!(filters.iter().all(|f| f["live"] == true));
}

#[tokio::test]
async fn test_unload_releases_the_plugin() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;

    let res = app.request(Method::POST, "/api/plugins/activity/unload").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["state"], "UNLOADED");
    assert!(res.body["data"].get("moduleId").is_none());

    let res = app.request(Method::GET, "/api/health").await;
    assert_eq!(res.body["data"]["plugins_started"], 0);

    // A fresh cycle brings it back.
    let res = app.request(Method::POST, "/api/plugins/activity/start").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["state"], "STARTED");
}

#[tokio::test]
async fn test_reload_restarts_started_plugins() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;
    let before = app.plugins.get("activity").await.unwrap().module_id;

    let res = app.request(Method::POST, "/api/plugins/reload").await;
    assert_eq!(res.status, StatusCode::OK);
    let plugins = res.body["data"].as_array().unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0]["state"], "STARTED");

    let after = app.plugins.get("activity").await.unwrap().module_id;
    assert!(after.is_some());
    assert_ne!(before, after);
}

#[tokio::test]
async fn test_failed_start_is_reported_and_sticky() {
    let app = app_with_broken_plugin();
    app.plugins
        .load(ska_plugin::ArchiveRef::in_memory(PluginManifest::new(
            "broken", "0.1.0", "broken",
        )))
        .await
        .unwrap();

    let res = app.request(Method::POST, "/api/plugins/broken/start").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"], "PLUGIN_ERROR");

    let res = app.request(Method::GET, "/api/plugins/broken").await;
    assert_eq!(res.body["data"]["state"], "FAILED");
    assert!(
        res.body["data"]["lastError"]
            .as_str()
            .unwrap()
            .contains("entry point exploded")
    );

    let res = app.request(Method::POST, "/api/plugins/broken/start").await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let hooks = app.request(Method::GET, "/api/plugins/hooks").await;
    assert!(hooks.body["data"]["filters"].as_array().unwrap().is_empty());
}
