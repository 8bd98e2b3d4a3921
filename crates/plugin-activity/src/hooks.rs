//! Hook implementations for the activity plugin.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use ska_plugin_sdk::prelude::*;

use crate::plugin::{PLUGIN_NAME, PLUGIN_VERSION};
use crate::properties::ActivityProperties;

/// Registered name of [`ActivityExpiryFilter`].
pub const EXPIRY_FILTER: &str = "activityExpiryFilter";
/// Registered name of [`ActivityInterceptor`].
pub const INTERCEPTOR: &str = "activityInterceptor";
/// Registered name of [`RequestLogFilter`].
pub const REQUEST_LOG_FILTER: &str = "activityRequestLogFilter";

/// Rejects activity requests once the plugin has expired.
pub struct ActivityExpiryFilter {
    properties: Arc<ActivityProperties>,
}

impl ActivityExpiryFilter {
    pub fn new(properties: Arc<ActivityProperties>) -> Self {
        Self { properties }
    }
}

#[async_trait]
impl RequestFilter for ActivityExpiryFilter {
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError> {
        if path_matches(&request.path, &self.properties.path_prefix) && self.properties.is_expired()
        {
            warn!(
                path = %request.path,
                expire_time = self.properties.expire_time_display(),
                "Activity plugin expired, rejecting request"
            );
            return Ok(Outcome::Rejected(Rejection::with_message(
                403,
                format!(
                    "Plugin has expired and can no longer be used. Expire time: {}",
                    self.properties.expire_time_display()
                ),
            )));
        }
        Ok(next.run(request).await)
    }
}

/// Same expiry check around the business handler, plus response stamping.
pub struct ActivityInterceptor {
    properties: Arc<ActivityProperties>,
}

impl ActivityInterceptor {
    pub fn new(properties: Arc<ActivityProperties>) -> Self {
        Self { properties }
    }

    fn applies_to(&self, request: &RequestContext) -> bool {
        path_matches(&request.path, &self.properties.path_prefix)
    }
}

#[async_trait]
impl RequestInterceptor for ActivityInterceptor {
    async fn before(&self, request: &mut RequestContext) -> Result<Verdict, HookError> {
        if self.applies_to(request) && self.properties.is_expired() {
            warn!(
                path = %request.path,
                expire_time = self.properties.expire_time_display(),
                "Activity plugin expired, interceptor rejecting request"
            );
            return Ok(Verdict::Reject(Rejection::new(
                403,
                json!({
                    "code": 403,
                    "message": format!(
                        "Plugin has expired (interceptor check) and can no longer be used. Expire time: {}",
                        self.properties.expire_time_display()
                    ),
                    "data": null,
                    "interceptor": "ActivityInterceptor",
                }),
            )));
        }
        Ok(Verdict::Continue)
    }

    async fn after(
        &self,
        request: &mut RequestContext,
        completion: &Completion,
    ) -> Result<(), HookError> {
        if self.applies_to(request) {
            request.set_attribute("pluginVersion", PLUGIN_VERSION);
            request.set_attribute("pluginName", PLUGIN_NAME);
            debug!(path = %request.path, status = completion.status, "Plugin info attached");
        }
        Ok(())
    }

    async fn finally(
        &self,
        request: &RequestContext,
        error: Option<&HookError>,
    ) -> Result<(), HookError> {
        if self.applies_to(request) {
            match error {
                Some(e) => warn!(
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    "Activity request finished with error"
                ),
                None => debug!(
                    method = %request.method,
                    path = %request.path,
                    "Activity request finished"
                ),
            }
        }
        Ok(())
    }
}

/// Logs every non-static request with its duration.
#[derive(Debug, Default)]
pub struct RequestLogFilter;

impl RequestLogFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RequestFilter for RequestLogFilter {
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError> {
        if is_static_path(&request.path) {
            return Ok(next.run(request).await);
        }

        let started = Instant::now();
        info!(
            method = %request.method,
            path = %request.path,
            query = request.query.as_deref().unwrap_or(""),
            remote_addr = request.remote_addr.as_deref().unwrap_or("-"),
            "Activity plugin request started"
        );
        let outcome = next.run(request).await;
        info!(
            method = %request.method,
            path = %request.path,
            status = outcome.status(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Activity plugin request finished"
        );
        Ok(outcome)
    }
}
