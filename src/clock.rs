//! A monotonic millisecond time source, injected everywhere staleness is evaluated so that tests
//! can control time without sleeping real wall-clock durations.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// A source of monotonic milliseconds since some arbitrary epoch.
///
/// Only relative differences between two readings are meaningful; implementations are not
/// required to agree with wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current time, in milliseconds, on this clock's monotonic scale.
    fn now_ms(&self) -> u64;
}

/// The default [`Clock`], backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A clock whose reading is advanced explicitly, for deterministic tests of idle/lifetime
/// pruning windows without real sleeps.
#[derive(Debug, Clone)]
pub struct FakeClock {
    millis: Arc<AtomicU64>,
}

impl FakeClock {
    /// Creates a new fake clock starting at time zero.
    pub fn new() -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advances the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
