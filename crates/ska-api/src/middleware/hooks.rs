//! Bridges Axum requests into the plugin hook chains.
//!
//! The filter chain wraps every non-admin route; the interceptor chain wraps the
//! business routes only. Both hand the rest of the Axum stack to the chain
//! as a [`Stage`], run the chain, and turn its outcome back into a response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use axum::Json;
use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::debug;

use ska_plugin::hooks::{Completion, HookError, Outcome, Rejection, RequestContext, Stage};

use crate::state::AppState;

/// Attributes hooks set on the request context. Inserted into the request
/// extensions before the downstream stage runs and into the response
/// extensions afterwards.
#[derive(Debug, Clone, Default)]
pub struct HookAttributes(pub HashMap<String, Value>);

impl HookAttributes {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// The rest of the Axum stack, runnable once.
struct NextStage {
    pending: Mutex<Option<(Request, Next)>>,
    response: Mutex<Option<Response>>,
}

impl NextStage {
    fn new(request: Request, next: Next) -> Self {
        Self {
            pending: Mutex::new(Some((request, next))),
            response: Mutex::new(None),
        }
    }

    fn take_response(&self) -> Option<Response> {
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Stage for NextStage {
    async fn call(&self, context: &mut RequestContext) -> Outcome {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((mut request, next)) = pending else {
            return Outcome::Failed(HookError::new("downstream stage already consumed"));
        };

        request
            .extensions_mut()
            .insert(HookAttributes(context.attributes.clone()));
        let response = next.run(request).await;
        let status = response.status();
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);

        if status.is_server_error() {
            Outcome::Failed(HookError::new(format!("handler responded {status}")))
        } else {
            Outcome::Completed(Completion::new(status.as_u16()))
        }
    }
}

/// Builds the hook chains' view of an Axum request. Paths are the full
/// request paths, also below nested routers.
pub fn request_context(request: &Request, state: &AppState) -> RequestContext {
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(request.uri());
    let mut context = RequestContext::new(request.method().as_str(), uri.path())
        .with_timeout(state.config.server.request_timeout());
    if let Some(query) = uri.query() {
        context = context.with_query(query);
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_remote_addr(addr.to_string());
    }
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            context = context.with_header(name.as_str(), value);
        }
    }
    context
}

fn rejection_response(rejection: Rejection) -> Response {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::FORBIDDEN);
    (status, Json(rejection.body)).into_response()
}

fn finish(outcome: Outcome, stage: &NextStage, context: RequestContext) -> Response {
    let mut response = match outcome {
        Outcome::Rejected(rejection) => {
            debug!(
                path = %context.path,
                status = rejection.status,
                rejected_by = rejection.rejected_by.as_deref().unwrap_or("-"),
                "Request rejected by hook"
            );
            rejection_response(rejection)
        }
        Outcome::Completed(_) | Outcome::Failed(_) => match stage.take_response() {
            Some(response) => response,
            None => rejection_response(Rejection::with_message(
                500,
                "Request could not be processed",
            )),
        },
    };
    let mut attributes = response
        .extensions_mut()
        .remove::<HookAttributes>()
        .unwrap_or_default();
    attributes.0.extend(context.attributes);
    response.extensions_mut().insert(attributes);
    response
}

/// Runs the filter chain around everything below it.
pub async fn filter_chain(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut context = request_context(&request, &state);
    let stage = NextStage::new(request, next);
    let outcome = state.filters.run(&mut context, &stage).await;
    finish(outcome, &stage, context)
}

/// Runs the interceptor chain around the business handler.
pub async fn interceptor_chain(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut context = request_context(&request, &state);
    if let Some(attributes) = request.extensions().get::<HookAttributes>() {
        context.attributes.extend(attributes.0.clone());
    }
    let stage = NextStage::new(request, next);
    let outcome = state.interceptors.run(&mut context, &stage).await;
    finish(outcome, &stage, context)
}
