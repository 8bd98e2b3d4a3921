//! Stopping a plugin while requests are inside its hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tokio::sync::watch;

use ska_core::config::FailurePolicy;
use ska_plugin::descriptor::{PluginManifest, PluginState};
use ska_plugin::prelude::*;

use crate::helpers::TestApp;

const IN_FLIGHT: usize = 100;

/// Counters shared between the test and the gate plugin.
#[derive(Default)]
struct GateCounters {
    entered: AtomicUsize,
    finished: AtomicUsize,
    finished_at_stop: AtomicUsize,
}

/// Holds every request until the test opens the gate.
struct GateFilter {
    counters: Arc<GateCounters>,
    open: watch::Receiver<bool>,
}

#[async_trait]
impl RequestFilter for GateFilter {
    async fn handle(
        &self,
        request: &mut RequestContext,
        next: FilterNext<'_>,
    ) -> Result<Outcome, HookError> {
        self.counters.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.clone();
        let opened = open.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(HookError::new("gate dropped"));
        }
        let outcome = next.run(request).await;
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }
}

struct GateModule {
    counters: Arc<GateCounters>,
    open: watch::Receiver<bool>,
}

#[async_trait]
impl PluginModule for GateModule {
    fn capabilities(&self) -> Vec<CapabilityDecl> {
        vec![CapabilityDecl::filter("gateFilter")]
    }

    async fn start(&self, _scope: &ModuleScope) -> Result<CapabilitySet, String> {
        Ok(CapabilitySet::new().filter(
            "gateFilter",
            Arc::new(GateFilter {
                counters: Arc::clone(&self.counters),
                open: self.open.clone(),
            }),
        ))
    }

    async fn stop(&self) -> Result<(), String> {
        let finished = self.counters.finished.load(Ordering::SeqCst);
        self.counters.finished_at_stop.store(finished, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_in_flight_requests() {
    let counters = Arc::new(GateCounters::default());
    let (open_tx, open_rx) = watch::channel(false);

    let loader = crate::helpers::activity_loader();
    {
        let counters = Arc::clone(&counters);
        loader.register("gate", move |_| {
            Ok(Box::new(GateModule {
                counters: Arc::clone(&counters),
                open: open_rx.clone(),
            }) as Box<dyn PluginModule>)
        });
    }
    let app = Arc::new(TestApp::with_loader(loader, FailurePolicy::FailClosed));
    app.install(PluginManifest::new("gate", "1.0.0", "gate")).await;

    let mut requests = Vec::with_capacity(IN_FLIGHT);
    for i in 0..IN_FLIGHT {
        let app = Arc::clone(&app);
        requests.push(tokio::spawn(async move {
            app.request(Method::GET, &format!("/api/activities/{i}"))
                .await
                .status
        }));
    }
    wait_until("requests to enter the gate", || {
        counters.entered.load(Ordering::SeqCst) == IN_FLIGHT
    })
    .await;

    let stopping = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.plugins.stop("gate").await })
    };

    // Withdrawn from the registry at once, but the stop is held by the drain.
    wait_until("the filter to be withdrawn", || {
        app.plugins.registry().is_empty()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stopping.is_finished());
    assert_eq!(counters.finished.load(Ordering::SeqCst), 0);

    // Requests arriving now bypass the withdrawn filter.
    let res = app.request(Method::GET, "/api/activities").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(counters.entered.load(Ordering::SeqCst), IN_FLIGHT);

    open_tx.send(true).unwrap();

    for request in requests {
        assert_eq!(request.await.unwrap(), StatusCode::OK);
    }
    let descriptor = stopping.await.unwrap().unwrap();
    assert_eq!(descriptor.state, PluginState::Stopped);
    assert_eq!(counters.finished_at_stop.load(Ordering::SeqCst), IN_FLIGHT);
}
