//! Response DTOs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ska_plugin::registry::RegisteredHook;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// Plugins currently started.
    pub plugins_started: usize,
}

/// One registered hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEntry {
    /// Composite `pluginId:name` key.
    pub key: String,
    /// Owning plugin.
    pub plugin_id: String,
    /// `filter` or `interceptor`.
    pub kind: String,
    /// Registration sequence; chains run hooks in this order.
    pub sequence: u64,
    /// Whether the instance is still reachable.
    pub live: bool,
}

impl From<&RegisteredHook> for HookEntry {
    fn from(hook: &RegisteredHook) -> Self {
        Self {
            key: hook.key.to_string(),
            plugin_id: hook.key.plugin_id.clone(),
            kind: hook.kind().to_string(),
            sequence: hook.sequence,
            live: hook.handle.is_live(),
        }
    }
}

/// Registry contents, per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksResponse {
    /// Id of the registry instance the chains read.
    pub registry_id: Uuid,
    /// Registered filters in execution order.
    pub filters: Vec<HookEntry>,
    /// Registered interceptors in execution order.
    pub interceptors: Vec<HookEntry>,
}

/// Response of the default business handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessResponse {
    pub method: String,
    pub path: String,
    pub message: String,
}
