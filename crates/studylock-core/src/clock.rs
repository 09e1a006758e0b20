//! Clock sources.
//!
//! The core never reads the system time directly. Wall-clock timestamps are
//! used for persisted fields and the override deadline; the monotonic reading
//! is only used to measure elapsed seconds between scheduler ticks.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Duration, Local};

pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Local>;

    /// Seconds since an arbitrary fixed origin. Never goes backwards.
    fn monotonic_seconds(&self) -> f64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn monotonic_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug)]
struct ManualInner {
    now: DateTime<Local>,
    mono: f64,
}

/// Hand-driven clock for tests and simulations.
///
/// Clones share the same time, so a test can keep a handle while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualInner {
                now: start,
                mono: 0.0,
            })),
        }
    }

    /// Move both readings forward by `secs`.
    pub fn advance_secs(&self, secs: u64) {
        let mut inner = self.lock();
        inner.now += Duration::seconds(secs as i64);
        inner.mono += secs as f64;
    }

    /// Jump the wall clock without touching the monotonic reading,
    /// like a process that was not running in between.
    pub fn set_wall(&self, now: DateTime<Local>) {
        self.lock().now = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualInner> {
        // A poisoned test clock is still a valid clock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.lock().now
    }

    fn monotonic_seconds(&self) -> f64 {
        self.lock().mono
    }
}

/// Converts monotonic readings into whole elapsed seconds.
///
/// Fractions are carried between calls so a 100 ms scheduler still advances
/// the timer by exactly one second every ten ticks.
#[derive(Debug, Clone, Default)]
pub struct ElapsedCounter {
    last: Option<f64>,
    carry: f64,
}

impl ElapsedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole seconds elapsed since the previous call. The first call
    /// only establishes the origin and returns 0.
    pub fn take(&mut self, monotonic_seconds: f64) -> u64 {
        let Some(last) = self.last.replace(monotonic_seconds) else {
            return 0;
        };
        let total = (monotonic_seconds - last).max(0.0) + self.carry;
        let whole = total.floor();
        self.carry = total - whole;
        whole as u64
    }
}
