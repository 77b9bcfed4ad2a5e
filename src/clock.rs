// SPDX-License-Identifier: GPL-3.0-only

//! Time sources for the capture loop
//!
//! Segment lengths, idle timeouts and measured frame rates are all derived
//! from [`Clock::now`]. Segment file names come from [`Clock::wall`].

use chrono::{DateTime, Local, TimeDelta};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic and wall-clock time source
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock's origin
    fn now(&self) -> Duration;

    /// Local wall-clock time, used for segment naming
    fn wall(&self) -> DateTime<Local>;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Real time
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock for simulated (accelerated) sessions
///
/// `sleep` advances the clock instead of blocking. Wall time is the
/// construction time plus the simulated elapsed time.
#[derive(Debug)]
pub struct ManualClock {
    elapsed_ns: AtomicU64,
    base: DateTime<Local>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    pub fn starting_at(base: DateTime<Local>) -> Self {
        Self {
            elapsed_ns: AtomicU64::new(0),
            base,
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.elapsed_ns
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    fn wall(&self) -> DateTime<Local> {
        let offset = TimeDelta::from_std(self.now()).unwrap_or_else(|_| TimeDelta::zero());
        self.base + offset
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
