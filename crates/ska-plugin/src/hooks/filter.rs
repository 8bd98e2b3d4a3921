//! Filter chain: hooks that wrap the whole request.
//!
//! A filter receives the request and a [`FilterNext`] continuation. It may
//! answer on its own (short-circuit) or call `next.run(request)` to hand
//! the request to the next filter and, eventually, the wrapped stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use ska_core::config::{ChainConfig, FailurePolicy};

use crate::capability::CapabilityKind;
use crate::registry::{CapabilityRegistry, RegisteredHook};

use super::definitions::{HookError, Outcome, Rejection, RequestContext, Stage};
use super::guard::{DownstreamClock, invoke_around};

/// A hook around the whole request.
#[async_trait]
pub trait RequestFilter: Send + Sync {
    /// Handles the request. Call `next.run(request)` to continue down the
    /// chain; return without calling it to short-circuit.
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError>;
}

/// What happened downstream of one filter invocation.
#[derive(Default)]
struct DownstreamRecord {
    entered: AtomicBool,
    outcome: Mutex<Option<Outcome>>,
    clock: DownstreamClock,
}

impl DownstreamRecord {
    fn enter(&self) {
        self.entered.store(true, Ordering::SeqCst);
        self.clock.pause();
    }

    fn finish(&self, outcome: Outcome) {
        self.clock.resume();
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    fn was_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Option<Outcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Continuation handed to a filter: the rest of the chain plus the wrapped
/// stage. Consumed by [`FilterNext::run`].
pub struct FilterNext<'a> {
    chain: &'a FilterChain,
    hooks: &'a [RegisteredHook],
    position: usize,
    stage: &'a dyn Stage,
    record: &'a DownstreamRecord,
}

impl FilterNext<'_> {
    /// Runs the remaining filters and the wrapped stage.
    pub async fn run(self, request: &mut RequestContext) -> Outcome {
        self.record.enter();
        let outcome = self
            .chain
            .run_from(self.hooks, self.position, request, self.stage)
            .await;
        self.record.finish(outcome.clone());
        outcome
    }
}

/// Executes every registered filter around a stage.
pub struct FilterChain {
    registry: Arc<CapabilityRegistry>,
    config: ChainConfig,
}

impl FilterChain {
    pub fn new(registry: Arc<CapabilityRegistry>, config: ChainConfig) -> Self {
        Self { registry, config }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Runs the request through a snapshot of the registered filters and
    /// then `stage`. With no filters registered the stage runs directly.
    pub async fn run(&self, request: &mut RequestContext, stage: &dyn Stage) -> Outcome {
        let hooks = self.registry.list_by_kind(CapabilityKind::Filter);
        if hooks.is_empty() {
            return stage.call(request).await;
        }

        debug!(
            request_id = %request.request_id,
            filters = hooks.len(),
            "Running filter chain"
        );
        self.run_from(&hooks, 0, request, stage).await
    }

    fn run_from<'a>(
        &'a self,
        hooks: &'a [RegisteredHook],
        position: usize,
        request: &'a mut RequestContext,
        stage: &'a dyn Stage,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut position = position;
            loop {
                let Some(entry) = hooks.get(position) else {
                    return stage.call(request).await;
                };

                let Some((filter, _permit)) = entry.handle.acquire_filter() else {
                    debug!(hook = %entry.key, "Skipping withdrawn filter");
                    position += 1;
                    continue;
                };

                let hook = entry.key.to_string();
                let record = DownstreamRecord::default();
                let next = FilterNext {
                    chain: self,
                    hooks,
                    position: position + 1,
                    stage,
                    record: &record,
                };
                let deadline = request.deadline;
                let result = invoke_around(
                    &hook,
                    self.config.hook_timeout(),
                    deadline,
                    &record.clock,
                    filter.handle(request, next),
                )
                .await;
                match result {
                    Ok(Outcome::Rejected(mut rejection)) if !record.was_entered() => {
                        info!(
                            request_id = %request.request_id,
                            hook = %hook,
                            status = rejection.status,
                            "Request rejected by filter"
                        );
                        rejection.rejected_by.get_or_insert(hook);
                        return Outcome::Rejected(rejection);
                    }
                    Ok(outcome) => return outcome,
                    Err(err) => {
                        warn!(
                            request_id = %request.request_id,
                            error = %err,
                            policy = %self.config.failure_policy,
                            "Filter failed"
                        );
                        match self.config.failure_policy {
                            FailurePolicy::FailClosed => {
                                return Outcome::Rejected(Rejection::generic().rejected_by(hook));
                            }
                            FailurePolicy::FailOpen => {
                                if let Some(outcome) = record.outcome() {
                                    return outcome;
                                }
                                if record.was_entered() {
                                    return Outcome::Failed(HookError::new(
                                        "downstream interrupted by failing filter",
                                    ));
                                }
                                position += 1;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{Fixture, Journal, RecordingStage, TestFilter};

    fn make_chain(fixture: &Fixture, policy: FailurePolicy) -> FilterChain {
        FilterChain::new(
            Arc::clone(&fixture.registry),
            ChainConfig::new(policy).with_hook_timeout_ms(200),
        )
    }

    #[tokio::test]
    async fn test_zero_filters_runs_stage_directly() {
        let journal = Journal::default();
        let fixture = Fixture::new();
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::new(&journal);

        let outcome = chain
            .run(&mut RequestContext::new("GET", "/api/activities"), &stage)
            .await;

        assert!(outcome.is_completed());
        assert_eq!(journal.entries(), vec!["stage"]);
    }

    #[tokio::test]
    async fn test_filters_run_in_registration_order() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "a", TestFilter::pass("a", &journal));
        fixture.filter("p", "b", TestFilter::pass("b", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::new(&journal);

        for _ in 0..100 {
            journal.clear();
            let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;
            assert_eq!(outcome.status(), 200);
            assert_eq!(
                journal.entries(),
                vec!["a:before", "b:before", "stage", "b:after", "a:after"]
            );
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "gate", TestFilter::reject("gate", &journal, 403));
        fixture.filter("p", "later", TestFilter::pass("later", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::new(&journal);

        let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;

        let Outcome::Rejected(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.status, 403);
        assert_eq!(rejection.rejected_by.as_deref(), Some("p:gate"));
        assert_eq!(journal.entries(), vec!["gate:reject"]);
    }

    #[tokio::test]
    async fn test_fail_open_skips_failing_filter() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "broken", TestFilter::fail("broken", &journal));
        fixture.filter("p", "ok", TestFilter::pass("ok", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailOpen);
        let stage = RecordingStage::new(&journal);

        let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;

        assert_eq!(outcome.status(), 200);
        assert_eq!(
            journal.entries(),
            vec!["broken:fail", "ok:before", "stage", "ok:after"]
        );
    }

    #[tokio::test]
    async fn test_fail_open_keeps_downstream_outcome() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "late", TestFilter::fail_after_next("late", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailOpen);
        let stage = RecordingStage::new(&journal);

        let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;

        assert_eq!(outcome.status(), 200);
        assert_eq!(journal.count("stage"), 1);
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_generically() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "broken", TestFilter::fail("broken", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::new(&journal);

        let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;

        let Outcome::Rejected(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection, Rejection::generic().rejected_by("p:broken"));
        assert_eq!(journal.count("stage"), 0);
    }

    #[tokio::test]
    async fn test_slow_filter_is_cut_off_by_budget() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter(
            "p",
            "slow",
            TestFilter::slow("slow", &journal, Duration::from_secs(10)),
        );
        let chain = make_chain(&fixture, FailurePolicy::FailOpen);
        let stage = RecordingStage::new(&journal);

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            chain.run(&mut RequestContext::new("GET", "/"), &stage),
        )
        .await
        .expect("budget should cut the slow filter off");

        assert_eq!(outcome.status(), 200);
        assert_eq!(journal.count("stage"), 1);
    }

    #[tokio::test]
    async fn test_slow_stage_behind_fast_filter_completes() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "outer", TestFilter::pass("outer", &journal));
        fixture.filter("p", "inner", TestFilter::pass("inner", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::slow(&journal, Duration::from_millis(600));

        let outcome = chain.run(&mut RequestContext::new("GET", "/"), &stage).await;

        assert_eq!(outcome.status(), 200);
        assert_eq!(
            journal.entries(),
            vec!["outer:before", "inner:before", "stage", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_filter_own_time_after_next_is_budgeted() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter(
            "p",
            "lingering",
            TestFilter::slow_after_next("lingering", &journal, Duration::from_secs(10)),
        );
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);
        let stage = RecordingStage::slow(&journal, Duration::from_millis(300));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            chain.run(&mut RequestContext::new("GET", "/"), &stage),
        )
        .await
        .expect("budget should cut the lingering filter off");

        assert_eq!(outcome, Outcome::Rejected(Rejection::generic().rejected_by("p:lingering")));
        assert_eq!(journal.count("stage"), 1);
        assert_eq!(journal.count("lingering:after"), 0);
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_registrations() {
        let journal = Journal::default();
        let mut fixture = Fixture::new();
        fixture.filter("p", "first", TestFilter::pass("first", &journal));
        let chain = make_chain(&fixture, FailurePolicy::FailClosed);

        let late = TestFilter::pass("late", &journal);
        let stage = RecordingStage::registering(&journal, &fixture, "q", "late", late);

        chain.run(&mut RequestContext::new("GET", "/"), &stage).await;
        assert_eq!(journal.count("late:before"), 0);

        journal.clear();
        chain.run(&mut RequestContext::new("GET", "/"), &stage).await;
        assert_eq!(journal.count("late:before"), 1);
    }
}
