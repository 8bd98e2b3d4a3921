//! In-flight tracking for a module context's hooks.
//!
//! Every hook invocation holds a [`DrainPermit`] for its module context's
//! [`DrainGate`]. Stopping a plugin closes the gate, so no new invocation
//! can enter, and waits until the permits already handed out are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Admission gate and in-flight counter for one module context.
#[derive(Debug)]
pub struct DrainGate {
    open: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl DrainGate {
    /// Creates an open gate with nothing in flight.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    /// Admits one invocation. Returns `None` once the gate is closed.
    pub fn try_enter(self: &Arc<Self>) -> Option<DrainPermit> {
        if !self.open.load(Ordering::SeqCst) {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let permit = DrainPermit {
            gate: Arc::clone(self),
        };
        // Lost the race against `close`; dropping the permit undoes the count.
        if !self.open.load(Ordering::SeqCst) {
            drop(permit);
            return None;
        }
        Some(permit)
    }

    /// Stops admitting new invocations.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of invocations currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no permit is outstanding.
    pub async fn drained(&self) {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Proof that one invocation is in flight. Released on drop.
#[derive(Debug)]
pub struct DrainPermit {
    gate: Arc<DrainGate>,
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.idle.notify_waiters();
        }
    }
}
