//! Shared coordination state for one run.
//!
//! A single `Run` value owns the stop/ready signals and the submitted/observed
//! counters, created at run start and discarded at teardown. This replaces
//! the original implementation's process-wide module globals (see
//! `examples/original_source/experiments/runner/workers.py`) with an
//! explicit value passed by `Arc` to every actor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::errors::{LastNon2xx, LastTransportError};

/// Which dimension bounds a run: exactly one of a request count or a wall-
/// clock time budget.
#[derive(Debug, Clone, Copy)]
pub enum Termination {
    ByCount(u64),
    ByTime(Duration),
}

impl Termination {
    pub fn request_cap(&self) -> Option<u64> {
        match self {
            Termination::ByCount(n) => Some(*n),
            Termination::ByTime(_) => None,
        }
    }

    /// The termination budget in its own unit (requests, or seconds) — used
    /// to resolve percentage thresholds like `--t-start 25%`.
    pub fn budget(&self) -> f64 {
        match self {
            Termination::ByCount(n) => *n as f64,
            Termination::ByTime(d) => d.as_secs_f64(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Termination::ByCount(_) => None,
            Termination::ByTime(d) => Some(*d),
        }
    }
}

/// One-shot broadcast stop signal. `assert()` is idempotent; `is_set()` is a
/// non-blocking check; `wait(d)` blocks up to `d` or returns immediately once
/// asserted.
#[derive(Debug, Default)]
pub struct Stop {
    flag: AtomicBool,
    notify: Notify,
}

impl Stop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&self) {
        // Only the transition from unset -> set wakes waiters; later callers
        // observe `is_set()` directly, so repeated asserts are true no-ops.
        if !self.flag.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Cancellable sleep: returns as soon as `d` elapses or stop is asserted,
    /// whichever comes first.
    pub async fn wait(&self, d: Duration) {
        if self.is_set() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_set() {
            return;
        }
        tokio::select! {
            _ = notified => {},
            _ = tokio::time::sleep(d) => {},
        }
    }

    /// Blocks until stop is asserted, with no timeout.
    pub async fn wait_forever(&self) {
        if self.is_set() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

/// Manual-reset latch: the scheduler clears it before pacing-sleeping and
/// workers set it on completion, waking the scheduler when a slot frees up.
#[derive(Debug, Default)]
pub struct Ready {
    flag: AtomicBool,
    notify: Notify,
}

impl Ready {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.flag.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// Shared state for one run: stop/ready signals and the submitted/observed
/// counters from which `in_flight = submitted - observed` is derived.
#[derive(Debug)]
pub struct Run {
    pub stop: Stop,
    pub ready: Ready,
    submitted: AtomicU64,
    observed: AtomicU64,
    /// Maximum value of `submitted`; `u64::MAX` when termination is by time.
    pub request_cap: u64,

    /// Retained for end-of-run surfacing.
    last_transport_error: Mutex<Option<LastTransportError>>,
    last_non2xx: Mutex<Option<LastNon2xx>>,
}

impl Run {
    pub fn new(request_cap: Option<u64>) -> Self {
        Self {
            stop: Stop::new(),
            ready: Ready::new(),
            submitted: AtomicU64::new(0),
            observed: AtomicU64::new(0),
            request_cap: request_cap.unwrap_or(u64::MAX),
            last_transport_error: Mutex::new(None),
            last_non2xx: Mutex::new(None),
        }
    }

    pub fn record_transport_error(&self, err: LastTransportError) {
        *self.last_transport_error.lock().unwrap() = Some(err);
    }

    pub fn last_transport_error(&self) -> Option<LastTransportError> {
        self.last_transport_error.lock().unwrap().clone()
    }

    pub fn record_non2xx(&self, err: LastNon2xx) {
        *self.last_non2xx.lock().unwrap() = Some(err);
    }

    pub fn last_non2xx(&self) -> Option<LastNon2xx> {
        self.last_non2xx.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> u64 {
        self.submitted().saturating_sub(self.observed())
    }

    pub fn at_request_cap(&self) -> bool {
        self.submitted() >= self.request_cap
    }

    /// Records a new submission and returns the updated `submitted` count.
    /// Does not itself assert `stop` on reaching the cap — that is the
    /// completing *worker's* job, done in `record_observation`.
    pub fn record_submission(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Like `record_submission`, but atomically refuses to exceed
    /// `request_cap`: concurrent callers racing past the `at_request_cap`
    /// check (e.g. several Concurrent-scheduler workers) cannot jointly
    /// overshoot it. Returns `false` (no increment) once the cap is taken.
    pub fn try_submit(&self) -> bool {
        let mut current = self.submitted.load(Ordering::Acquire);
        loop {
            if current >= self.request_cap {
                return false;
            }
            match self.submitted.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Records a completed observation and returns the updated `observed`
    /// count. Asserts `stop` once `submitted` has reached `request_cap` and
    /// signals `ready` so a waiting scheduler can resume.
    pub fn record_observation(&self) -> u64 {
        let n = self.observed.fetch_add(1, Ordering::AcqRel) + 1;
        if self.at_request_cap() {
            self.stop.assert();
        }
        self.ready.set();
        n
    }
}
