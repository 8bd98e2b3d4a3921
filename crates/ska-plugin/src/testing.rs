//! Test fixtures shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::capability::{CapabilityDecl, CapabilityInstance, CapabilitySet};
use crate::drain::DrainGate;
use crate::hooks::definitions::{
    Completion, HookError, Outcome, Rejection, RequestContext, Stage, Verdict,
};
use crate::hooks::filter::{FilterNext, RequestFilter};
use crate::hooks::interceptor::RequestInterceptor;
use crate::module::{ModuleScope, PluginModule};
use crate::registry::{CapabilityRegistry, HookHandle};

/// Ordered log of what the fixtures did.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// A registry plus the hook instances registered in it, kept alive for the
/// duration of a test.
pub struct Fixture {
    pub registry: Arc<CapabilityRegistry>,
    pub gate: Arc<DrainGate>,
    instances: Vec<CapabilityInstance>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CapabilityRegistry::new()),
            gate: DrainGate::new(),
            instances: Vec::new(),
        }
    }

    pub fn filter(&mut self, plugin_id: &str, name: &str, filter: Arc<dyn RequestFilter>) {
        self.add(plugin_id, name, CapabilityInstance::Filter(filter));
    }

    pub fn interceptor(
        &mut self,
        plugin_id: &str,
        name: &str,
        interceptor: Arc<dyn RequestInterceptor>,
    ) {
        self.add(plugin_id, name, CapabilityInstance::Interceptor(interceptor));
    }

    fn add(&mut self, plugin_id: &str, name: &str, instance: CapabilityInstance) {
        let handle = HookHandle::new(&instance, Arc::clone(&self.gate));
        self.registry.register(plugin_id, name, handle).unwrap();
        self.instances.push(instance);
    }
}

enum FilterBehavior {
    Pass,
    Reject(u16),
    Fail,
    FailAfterNext,
    Slow(Duration),
    SlowAfterNext(Duration),
}

pub struct TestFilter {
    label: String,
    journal: Journal,
    behavior: FilterBehavior,
}

impl TestFilter {
    fn make(label: &str, journal: &Journal, behavior: FilterBehavior) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            journal: journal.clone(),
            behavior,
        })
    }

    pub fn pass(label: &str, journal: &Journal) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::Pass)
    }

    pub fn reject(label: &str, journal: &Journal, status: u16) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::Reject(status))
    }

    pub fn fail(label: &str, journal: &Journal) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::Fail)
    }

    pub fn fail_after_next(label: &str, journal: &Journal) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::FailAfterNext)
    }

    pub fn slow(label: &str, journal: &Journal, delay: Duration) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::Slow(delay))
    }

    pub fn slow_after_next(label: &str, journal: &Journal, delay: Duration) -> Arc<Self> {
        Self::make(label, journal, FilterBehavior::SlowAfterNext(delay))
    }
}

#[async_trait]
impl RequestFilter for TestFilter {
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError> {
        let label = &self.label;
        match self.behavior {
            FilterBehavior::Pass => {
                self.journal.push(format!("{label}:before"));
                let outcome = next.run(request).await;
                self.journal.push(format!("{label}:after"));
                Ok(outcome)
            }
            FilterBehavior::Reject(status) => {
                self.journal.push(format!("{label}:reject"));
                Ok(Outcome::Rejected(Rejection::with_message(status, "rejected")))
            }
            FilterBehavior::Fail => {
                self.journal.push(format!("{label}:fail"));
                Err(HookError::new("filter failure"))
            }
            FilterBehavior::FailAfterNext => {
                next.run(request).await;
                self.journal.push(format!("{label}:fail"));
                Err(HookError::new("filter failure after next"))
            }
            FilterBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(next.run(request).await)
            }
            FilterBehavior::SlowAfterNext(delay) => {
                let outcome = next.run(request).await;
                tokio::time::sleep(delay).await;
                self.journal.push(format!("{label}:after"));
                Ok(outcome)
            }
        }
    }
}

enum BeforeBehavior {
    Continue,
    Reject(u16),
    Fail,
}

pub struct TestInterceptor {
    label: String,
    journal: Journal,
    before: BeforeBehavior,
    fail_finally: bool,
    panic_finally: bool,
}

impl TestInterceptor {
    fn make(label: &str, journal: &Journal, before: BeforeBehavior) -> Self {
        Self {
            label: label.to_string(),
            journal: journal.clone(),
            before,
            fail_finally: false,
            panic_finally: false,
        }
    }

    pub fn pass(label: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self::make(label, journal, BeforeBehavior::Continue))
    }

    pub fn reject(label: &str, journal: &Journal, status: u16) -> Arc<Self> {
        Arc::new(Self::make(label, journal, BeforeBehavior::Reject(status)))
    }

    pub fn fail(label: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self::make(label, journal, BeforeBehavior::Fail))
    }
}

/// Builder-style tweaks on an `Arc<TestInterceptor>` straight from a
/// constructor.
pub trait TestInterceptorExt {
    fn failing_finally(self) -> Arc<TestInterceptor>;
    fn panicking_finally(self) -> Arc<TestInterceptor>;
}

impl TestInterceptorExt for Arc<TestInterceptor> {
    fn failing_finally(self) -> Arc<TestInterceptor> {
        let mut inner = Arc::try_unwrap(self).ok().unwrap();
        inner.fail_finally = true;
        Arc::new(inner)
    }

    fn panicking_finally(self) -> Arc<TestInterceptor> {
        let mut inner = Arc::try_unwrap(self).ok().unwrap();
        inner.panic_finally = true;
        Arc::new(inner)
    }
}

#[async_trait]
impl RequestInterceptor for TestInterceptor {
    async fn before(&self, _request: &mut RequestContext) -> Result<Verdict, HookError> {
        self.journal.push(format!("{}:before", self.label));
        match self.before {
            BeforeBehavior::Continue => Ok(Verdict::Continue),
            BeforeBehavior::Reject(status) => Ok(Verdict::Reject(Rejection::with_message(
                status, "rejected",
            ))),
            BeforeBehavior::Fail => Err(HookError::new("interceptor failure")),
        }
    }

    async fn after(
        &self,
        _request: &mut RequestContext,
        _completion: &Completion,
    ) -> Result<(), HookError> {
        self.journal.push(format!("{}:after", self.label));
        Ok(())
    }

    async fn finally(
        &self,
        _request: &RequestContext,
        error: Option<&HookError>,
    ) -> Result<(), HookError> {
        match error {
            Some(_) => self.journal.push(format!("{}:finally:error", self.label)),
            None => self.journal.push(format!("{}:finally", self.label)),
        }
        if self.panic_finally {
            panic!("finally panicked");
        }
        if self.fail_finally {
            return Err(HookError::new("finally failure"));
        }
        Ok(())
    }
}

/// Stage that records itself and answers 200, or fails.
pub struct RecordingStage {
    journal: Journal,
    fail: bool,
    delay: Option<Duration>,
    late: Option<LateRegistration>,
}

struct LateRegistration {
    registry: Arc<CapabilityRegistry>,
    gate: Arc<DrainGate>,
    plugin_id: String,
    name: String,
    instance: CapabilityInstance,
    done: AtomicBool,
}

impl RecordingStage {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail: false,
            delay: None,
            late: None,
        }
    }

    /// A stage that takes `delay` before answering 200.
    pub fn slow(journal: &Journal, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(journal)
        }
    }

    pub fn failing(journal: &Journal) -> Self {
        Self {
            fail: true,
            ..Self::new(journal)
        }
    }

    /// A stage that registers `filter` the first time it runs, while the
    /// request that triggered it is still in flight.
    pub fn registering(
        journal: &Journal,
        fixture: &Fixture,
        plugin_id: &str,
        name: &str,
        filter: Arc<dyn RequestFilter>,
    ) -> Self {
        Self {
            late: Some(LateRegistration {
                registry: Arc::clone(&fixture.registry),
                gate: Arc::clone(&fixture.gate),
                plugin_id: plugin_id.to_string(),
                name: name.to_string(),
                instance: CapabilityInstance::Filter(filter),
                done: AtomicBool::new(false),
            }),
            ..Self::new(journal)
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn call(&self, _request: &mut RequestContext) -> Outcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.push("stage");
        if let Some(late) = &self.late {
            if !late.done.swap(true, Ordering::SeqCst) {
                let handle = HookHandle::new(&late.instance, Arc::clone(&late.gate));
                late.registry
                    .register(&late.plugin_id, &late.name, handle)
                    .unwrap();
            }
        }
        if self.fail {
            return Outcome::Failed(HookError::new("handler failure"));
        }
        Outcome::Completed(Completion::new(200))
    }
}

/// Module producing one pass-through filter and one pass-through
/// interceptor, or nothing.
pub struct TestModule {
    journal: Journal,
    with_hooks: bool,
    fail_start: bool,
}

impl TestModule {
    pub fn empty() -> Self {
        Self {
            journal: Journal::default(),
            with_hooks: false,
            fail_start: false,
        }
    }

    pub fn with_hooks(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            with_hooks: true,
            fail_start: false,
        }
    }

    pub fn failing(journal: &Journal) -> Self {
        Self {
            fail_start: true,
            ..Self::with_hooks(journal)
        }
    }
}

#[async_trait]
impl PluginModule for TestModule {
    fn capabilities(&self) -> Vec<CapabilityDecl> {
        if !self.with_hooks {
            return Vec::new();
        }
        vec![
            CapabilityDecl::filter("filterA"),
            CapabilityDecl::interceptor("interceptorA"),
        ]
    }

    async fn start(&self, scope: &ModuleScope) -> Result<CapabilitySet, String> {
        self.journal.push(format!("{}:start", scope.plugin_id));
        if self.fail_start {
            return Err("entry point exploded".to_string());
        }
        if !self.with_hooks {
            return Ok(CapabilitySet::new());
        }
        Ok(CapabilitySet::new()
            .filter("filterA", TestFilter::pass("filterA", &self.journal))
            .interceptor("interceptorA", TestInterceptor::pass("interceptorA", &self.journal)))
    }

    async fn stop(&self) -> Result<(), String> {
        self.journal.push("module:stop");
        Ok(())
    }
}
