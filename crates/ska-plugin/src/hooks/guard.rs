//! Budgeted, panic-isolated invocation of a single hook.

use std::future::{Future, poll_fn};
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::error::HookExecutionError;

use super::definitions::{HookError, RequestContext};

/// Budget for the next hook: the chain's per-hook budget, capped by what is
/// left of the request deadline.
pub(crate) fn budget_for(request: &RequestContext, per_hook: Duration) -> Duration {
    match request.remaining() {
        Some(remaining) => remaining.min(per_hook),
        None => per_hook,
    }
}

/// Tracks the time a filter spends waiting on the rest of the chain. That
/// time is not charged to the filter's own budget.
#[derive(Debug, Default)]
pub(crate) struct DownstreamClock {
    state: Mutex<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    since: Option<Instant>,
    excluded: Duration,
}

impl DownstreamClock {
    pub(crate) fn pause(&self) {
        self.lock().since.get_or_insert_with(Instant::now);
    }

    pub(crate) fn resume(&self) {
        let mut state = self.lock();
        if let Some(since) = state.since.take() {
            state.excluded += since.elapsed();
        }
    }

    /// Downstream time up to `now`, and whether downstream is running.
    fn excluded(&self, now: Instant) -> (Duration, bool) {
        let state = self.lock();
        match state.since {
            Some(since) => (state.excluded + now.saturating_duration_since(since), true),
            None => (state.excluded, false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// When the running hook runs out of budget. `None` once it has.
///
/// Only the hook's own time counts against `per_hook`. The request deadline
/// is enforced while the hook itself runs, never while downstream work does.
fn expiry(
    started: Instant,
    per_hook: Duration,
    deadline: Option<Instant>,
    clock: Option<&DownstreamClock>,
) -> Option<Instant> {
    let now = Instant::now();
    let (excluded, downstream) = clock.map_or((Duration::ZERO, false), |c| c.excluded(now));
    let own = now.saturating_duration_since(started).saturating_sub(excluded);
    let left = per_hook.checked_sub(own).filter(|left| !left.is_zero())?;
    let own_expiry = now + left;

    match deadline {
        Some(deadline) if !downstream => (deadline > now).then(|| own_expiry.min(deadline)),
        _ => Some(own_expiry),
    }
}

/// Runs one hook call. An error, a panic, or an exceeded budget becomes a
/// [`HookExecutionError`]; the caller's task keeps running either way.
///
/// The budget is enforced at the hook's next await point. A hook that blocks
/// without yielding cannot be interrupted.
pub(crate) async fn invoke<T, F>(
    hook: &str,
    budget: Duration,
    call: F,
) -> Result<T, HookExecutionError>
where
    F: Future<Output = Result<T, HookError>>,
{
    invoke_budgeted(hook, budget, None, None, call).await
}

/// Runs a filter call whose downstream time is tracked by `clock`.
pub(crate) async fn invoke_around<T, F>(
    hook: &str,
    per_hook: Duration,
    deadline: Option<Instant>,
    clock: &DownstreamClock,
    call: F,
) -> Result<T, HookExecutionError>
where
    F: Future<Output = Result<T, HookError>>,
{
    invoke_budgeted(hook, per_hook, deadline, Some(clock), call).await
}

async fn invoke_budgeted<T, F>(
    hook: &str,
    per_hook: Duration,
    deadline: Option<Instant>,
    clock: Option<&DownstreamClock>,
    call: F,
) -> Result<T, HookExecutionError>
where
    F: Future<Output = Result<T, HookError>>,
{
    let started = Instant::now();
    let mut call = pin!(AssertUnwindSafe(call).catch_unwind());
    let mut timer = pin!(tokio::time::sleep(per_hook));

    // The expiry moves while downstream work runs, so it is recomputed on
    // every wake-up.
    let finished = poll_fn(|cx| {
        if let Poll::Ready(result) = call.as_mut().poll(cx) {
            return Poll::Ready(Some(result));
        }
        loop {
            let Some(at) = expiry(started, per_hook, deadline, clock) else {
                return Poll::Ready(None);
            };
            if timer.deadline() != at {
                timer.as_mut().reset(at);
            }
            if timer.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
        }
    })
    .await;

    match finished {
        Some(Ok(Ok(value))) => Ok(value),
        Some(Ok(Err(err))) => Err(HookExecutionError::Failed {
            hook: hook.to_string(),
            message: err.message,
        }),
        Some(Err(_panic)) => Err(HookExecutionError::Panicked {
            hook: hook.to_string(),
        }),
        None => Err(HookExecutionError::TimedOut {
            hook: hook.to_string(),
            budget_ms: per_hook.as_millis() as u64,
        }),
    }
}
