//! The statistics observer: read-only occupancy counters, registered at manager construction and
//! unregistered at close.
//!
//! A single snapshot-style observer rather than a full lifecycle-event catalogue — telemetry
//! *publication* is an external collaborator's concern, not this pool's.

use std::fmt;

/// A point-in-time view of a pool's occupancy, safe to read without locking since every field is
/// sourced from an atomic counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStatisticsSnapshot {
    /// Total live items: checked out plus available.
    pub size: u64,
    /// `size - available`.
    pub checked_out_count: u64,
    /// Current count of threads attempting acquisition.
    pub wait_queue_size: u64,
    /// Configured floor.
    pub min_size: u32,
    /// Configured ceiling.
    pub max_size: u32,
}

/// A registered observer of pool statistics. Implementations typically forward the snapshot to a
/// metrics sink; the default is a no-op so that instrumentation is entirely opt-in.
pub trait PoolStatisticsObserver: Send + Sync + fmt::Debug {
    /// Called whenever a caller asks the manager to publish its current statistics.
    fn on_statistics(&self, snapshot: PoolStatisticsSnapshot);
}

/// An observer that discards every snapshot. This is what a
/// [`crate::manager::PoolManager`] uses when constructed without an explicit observer.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PoolStatisticsObserver for NoopObserver {
    fn on_statistics(&self, _snapshot: PoolStatisticsSnapshot) {}
}

/// Registers and unregisters a [`PoolStatisticsObserver`] under a stable name.
///
/// A caller-injected registry rather than a process-wide singleton: this crate never reaches for
/// a global registry directly — callers inject whatever registry fits their process.
pub trait ObserverRegistry: Send + Sync + fmt::Debug {
    /// Registers `observer` under `name`, replacing any previous registration for that name.
    fn register(&self, name: &str, observer: std::sync::Arc<dyn PoolStatisticsObserver>);

    /// Removes the registration under `name`, if any.
    fn unregister(&self, name: &str);
}

/// An [`ObserverRegistry`] that does nothing; the default when a caller doesn't need one.
#[derive(Debug, Default)]
pub struct NoopRegistry;

impl ObserverRegistry for NoopRegistry {
    fn register(&self, _name: &str, _observer: std::sync::Arc<dyn PoolStatisticsObserver>) {}
    fn unregister(&self, _name: &str) {}
}
