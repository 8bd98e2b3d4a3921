//! HTTP client for the host's plugin admin API.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ska_core::error::AppError;

/// A plugin as reported by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub plugin_id: String,
    pub version: String,
    pub state: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A registered hook as reported by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRecord {
    pub key: String,
    pub kind: String,
    pub sequence: u64,
    pub live: bool,
}

/// Registry contents as reported by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksRecord {
    pub registry_id: String,
    pub filters: Vec<HookRecord>,
    pub interceptors: Vec<HookRecord>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Talks to `/api/plugins` on one host.
pub struct AdminClient {
    base_url: String,
    http: Client,
}

impl AdminClient {
    pub fn new(server: &str) -> Self {
        Self {
            base_url: server.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/plugins{}", self.base_url, path)
    }

    pub async fn list(&self) -> Result<Vec<PluginRecord>, AppError> {
        self.call(Method::GET, "").await
    }

    pub async fn get(&self, id: &str) -> Result<PluginRecord, AppError> {
        self.call(Method::GET, &format!("/{id}")).await
    }

    pub async fn start(&self, id: &str) -> Result<PluginRecord, AppError> {
        self.call(Method::POST, &format!("/{id}/start")).await
    }

    pub async fn stop(&self, id: &str) -> Result<PluginRecord, AppError> {
        self.call(Method::POST, &format!("/{id}/stop")).await
    }

    pub async fn unload(&self, id: &str) -> Result<PluginRecord, AppError> {
        self.call(Method::POST, &format!("/{id}/unload")).await
    }

    pub async fn reload_all(&self) -> Result<Vec<PluginRecord>, AppError> {
        self.call(Method::POST, "/reload").await
    }

    pub async fn hooks(&self) -> Result<HooksRecord, AppError> {
        self.call(Method::GET, "/hooks").await
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, AppError> {
        let url = self.url(path);
        tracing::debug!(method = %method, url = %url, "Admin API call");

        let response = self
            .http
            .request(method, &url)
            .send()
            .await
            .map_err(|e| AppError::external(format!("Failed to reach {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(error_for_status(status, message));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map(|envelope| envelope.data)
            .map_err(|e| AppError::external(format!("Unexpected response from {url}: {e}")))
    }
}

/// Maps an admin API error status back onto an `AppError`.
fn error_for_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::NOT_FOUND => AppError::not_found(message),
        StatusCode::CONFLICT => AppError::conflict(message),
        StatusCode::UNPROCESSABLE_ENTITY => AppError::plugin(message),
        StatusCode::BAD_REQUEST => AppError::validation(message),
        _ => AppError::external(message),
    }
}
