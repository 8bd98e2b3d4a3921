//! End-to-end tests for the activity plugin behind the HTTP host.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::helpers::{FAR_FUTURE, LONG_AGO, TestApp, activity_manifest};

#[tokio::test]
async fn test_expired_plugin_rejects_activity_requests() {
    let app = TestApp::new();
    app.install(activity_manifest(LONG_AGO)).await;

    let res = app.request(Method::GET, "/api/activities").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["code"], 403);
    assert!(
        res.body["message"]
            .as_str()
            .unwrap()
            .contains("Expire time: 2000-01-01 00:00:00")
    );

    let res = app.request(Method::POST, "/api/activities/42/join").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_plugin_leaves_other_routes_alone() {
    let app = TestApp::new();
    app.install(activity_manifest(LONG_AGO)).await;

    let res = app.request(Method::GET, "/api/health").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["plugins_started"], 1);

    let res = app.request(Method::GET, "/api/plugins").await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_live_plugin_stamps_activity_responses() {
    let app = TestApp::new();
    app.install(activity_manifest(FAR_FUTURE)).await;

    let res = app.request(Method::GET, "/api/activities/7").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["path"], "/api/activities/7");
    assert_eq!(
        res.attributes.get("pluginName"),
        Some(&json!(plugin_activity::PLUGIN_NAME))
    );
    assert_eq!(
        res.attributes.get("pluginVersion"),
        Some(&json!(plugin_activity::PLUGIN_VERSION))
    );
}

#[tokio::test]
async fn test_stopped_plugin_no_longer_guards_requests() {
    let app = TestApp::new();
    let plugin_id = app.install(activity_manifest(LONG_AGO)).await;

    let res = app.request(Method::GET, "/api/activities").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .request(Method::POST, &format!("/api/plugins/{plugin_id}/stop"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["state"], "STOPPED");

    let res = app.request(Method::GET, "/api/activities").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.attributes.get("pluginName").is_none());

    let res = app
        .request(Method::POST, &format!("/api/plugins/{plugin_id}/start"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["state"], "STARTED");

    let res = app.request(Method::GET, "/api/activities").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_no_plugins_means_plain_pipeline() {
    let app = TestApp::new();

    let res = app.request(Method::DELETE, "/api/activities/3").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["method"], "DELETE");
    assert!(res.attributes.0.is_empty());
}
