//! Request-side types shared by filters, interceptors, and the host.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// The host's view of an in-flight request, handed to every hook.
///
/// Header names are stored lower-cased. Hooks share state with each other and
/// with the business handler through `attributes`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id of this request.
    pub request_id: Uuid,
    /// HTTP method.
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Peer address, when the transport exposes one.
    pub remote_addr: Option<String>,
    /// Request headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Values set by hooks along the way.
    pub attributes: HashMap<String, Value>,
    /// When the host received the request.
    pub received_at: DateTime<Utc>,
    /// Deadline of the whole request. Hook budgets never extend past it.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context for `method path` with no headers and no deadline.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            query: None,
            remote_addr: None,
            headers: HashMap::new(),
            attributes: HashMap::new(),
            received_at: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the request deadline to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Looks up a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Time left until the deadline. `None` when the request has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// The wrapped stage ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Status code of the produced response.
    pub status: u16,
}

impl Completion {
    pub fn new(status: u16) -> Self {
        Self { status }
    }
}

/// A hook short-circuited the request with its own response.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Status code sent to the client.
    pub status: u16,
    /// JSON body sent to the client.
    pub body: Value,
    /// Composite key of the hook that rejected. Never sent to the client.
    pub rejected_by: Option<String>,
}

impl Rejection {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            rejected_by: None,
        }
    }

    /// A rejection using the host's `{code, message, data}` envelope.
    pub fn with_message(status: u16, message: impl Into<String>) -> Self {
        Self::new(
            status,
            json!({ "code": status, "message": message.into(), "data": null }),
        )
    }

    /// The response used when a fail-closed chain rejects because of a
    /// broken hook. Carries no detail about the failure.
    pub fn generic() -> Self {
        Self::with_message(503, "Request could not be processed")
    }

    pub fn rejected_by(mut self, hook: impl Into<String>) -> Self {
        self.rejected_by = Some(hook.into());
        self
    }
}

/// Error returned by a hook implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// How a request (or a segment of a chain) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The business stage produced a response.
    Completed(Completion),
    /// A hook answered on the stage's behalf.
    Rejected(Rejection),
    /// The stage itself failed.
    Failed(HookError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Status code the client ends up seeing.
    pub fn status(&self) -> u16 {
        match self {
            Self::Completed(completion) => completion.status,
            Self::Rejected(rejection) => rejection.status,
            Self::Failed(_) => 500,
        }
    }
}

/// Result of an interceptor's `before` callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Let the request through.
    Continue,
    /// Stop here and answer with this rejection.
    Reject(Rejection),
}

/// The stage a chain wraps: the rest of the host pipeline, or the business
/// handler.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn call(&self, request: &mut RequestContext) -> Outcome;
}
