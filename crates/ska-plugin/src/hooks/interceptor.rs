//! Interceptor chain: hooks around the business handler.
//!
//! Every interceptor whose `before` let the request through is remembered.
//! Once the handler produced a response, `after` runs for those interceptors
//! in the same order. `finally` then runs for them in reverse order,
//! whatever happened in between.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ska_core::config::{ChainConfig, FailurePolicy};

use crate::capability::CapabilityKind;
use crate::drain::DrainPermit;
use crate::registry::CapabilityRegistry;

use super::definitions::{
    Completion, HookError, Outcome, Rejection, RequestContext, Stage, Verdict,
};
use super::guard::{budget_for, invoke};

/// A hook around the business handler.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Runs before the handler. `Verdict::Reject` stops the request.
    async fn before(&self, request: &mut RequestContext) -> Result<Verdict, HookError>;

    /// Runs after the handler completed.
    async fn after(
        &self,
        _request: &mut RequestContext,
        _completion: &Completion,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Always runs once `before` let the request through. `error` is set
    /// when the handler or a later hook failed.
    async fn finally(
        &self,
        _request: &RequestContext,
        _error: Option<&HookError>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// An interceptor whose `before` returned `Continue`. Holds its drain
/// permit until `finally` ran.
struct Invoked {
    hook: String,
    interceptor: Arc<dyn RequestInterceptor>,
    _permit: DrainPermit,
}

/// Executes every registered interceptor around a stage.
pub struct InterceptorChain {
    registry: Arc<CapabilityRegistry>,
    config: ChainConfig,
}

impl InterceptorChain {
    pub fn new(registry: Arc<CapabilityRegistry>, config: ChainConfig) -> Self {
        Self { registry, config }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Runs the request through a snapshot of the registered interceptors
    /// around `stage`.
    pub async fn run(&self, request: &mut RequestContext, stage: &dyn Stage) -> Outcome {
        let hooks = self.registry.list_by_kind(CapabilityKind::Interceptor);
        if hooks.is_empty() {
            return stage.call(request).await;
        }

        let mut invoked: Vec<Invoked> = Vec::with_capacity(hooks.len());
        let mut failure: Option<HookError> = None;
        let mut short_circuit: Option<Outcome> = None;

        for entry in &hooks {
            let Some((interceptor, permit)) = entry.handle.acquire_interceptor() else {
                debug!(hook = %entry.key, "Skipping withdrawn interceptor");
                continue;
            };

            let hook = entry.key.to_string();
            let budget = budget_for(request, self.config.hook_timeout());
            let verdict = invoke(&hook, budget, interceptor.before(request)).await;

            match verdict {
                Ok(Verdict::Continue) => invoked.push(Invoked {
                    hook,
                    interceptor,
                    _permit: permit,
                }),
                Ok(Verdict::Reject(rejection)) => {
                    info!(
                        request_id = %request.request_id,
                        hook = %hook,
                        status = rejection.status,
                        "Request rejected by interceptor"
                    );
                    short_circuit = Some(Outcome::Rejected(rejection.rejected_by(hook)));
                    break;
                }
                Err(err) => {
                    warn!(
                        request_id = %request.request_id,
                        error = %err,
                        policy = %self.config.failure_policy,
                        "Interceptor before-callback failed"
                    );
                    if self.config.failure_policy == FailurePolicy::FailClosed {
                        failure = Some(HookError::new(err.to_string()));
                        short_circuit = Some(Outcome::Rejected(Rejection::generic().rejected_by(hook)));
                        break;
                    }
                }
            }
        }

        let outcome = match short_circuit {
            Some(outcome) => outcome,
            None => self.complete(request, stage, &invoked, &mut failure).await,
        };

        for done in invoked.iter().rev() {
            let budget = budget_for(request, self.config.hook_timeout());
            let result = invoke(
                &done.hook,
                budget,
                done.interceptor.finally(request, failure.as_ref()),
            )
            .await;
            if let Err(err) = result {
                warn!(
                    request_id = %request.request_id,
                    error = %err,
                    "Interceptor finally-callback failed"
                );
            }
        }

        outcome
    }

    /// Runs the stage, then the `after` callbacks of every invoked
    /// interceptor.
    async fn complete(
        &self,
        request: &mut RequestContext,
        stage: &dyn Stage,
        invoked: &[Invoked],
        failure: &mut Option<HookError>,
    ) -> Outcome {
        let outcome = stage.call(request).await;
        let completion = match &outcome {
            Outcome::Completed(completion) => completion.clone(),
            Outcome::Failed(err) => {
                *failure = Some(err.clone());
                return outcome;
            }
            Outcome::Rejected(_) => return outcome,
        };

        for done in invoked {
            let budget = budget_for(request, self.config.hook_timeout());
            let result = invoke(
                &done.hook,
                budget,
                done.interceptor.after(request, &completion),
            )
            .await;
            if let Err(err) = result {
                warn!(
                    request_id = %request.request_id,
                    error = %err,
                    policy = %self.config.failure_policy,
                    "Interceptor after-callback failed"
                );
                if self.config.failure_policy == FailurePolicy::FailClosed {
                    *failure = Some(HookError::new(err.to_string()));
                    return Outcome::Rejected(Rejection::generic().rejected_by(done.hook.clone()));
                }
            }
        }

        outcome
    }
}
