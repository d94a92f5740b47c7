//! `ConcurrentPool` — a bounded, semaphore-guarded set of items with blocking acquire, release,
//! prune, and ensure-min-size.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::{
    clock::Clock,
    connection::UsageTrackingConnection,
    error::{Error, Result},
    factory::InternalConnectionFactory,
    item_factory::{DestroyReason, ItemFactory},
    semaphore::{Semaphore, Wait},
};

/// A bounded set of `UsageTrackingConnection` items, guarded by a permit semaphore.
///
/// `size` (permits currently held) never exceeds `max_size`; every item in `available` is owned
/// exclusively by the pool, and every other live item is owned by exactly one caller between
/// `get` and `release`.
pub(crate) struct ConcurrentPool<F, Clk>
where
    F: InternalConnectionFactory,
{
    permits: Semaphore,
    available: Mutex<Vec<UsageTrackingConnection<F::Connection>>>,
    size: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
    factory: ItemFactory<F, Clk>,
}

impl<F, Clk> ConcurrentPool<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    pub(crate) fn new(max_size: u32, factory: ItemFactory<F, Clk>) -> Self {
        Self {
            permits: Semaphore::new(max_size as usize),
            available: Mutex::new(Vec::new()),
            size: AtomicU64::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
            factory,
        }
    }

    /// The number of live items: checked out plus available. Never exceeds `max_size`.
    pub(crate) fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// The number of items currently free in `available`.
    pub(crate) fn available_count(&self) -> u64 {
        self.available.lock().unwrap().len() as u64
    }

    pub(crate) fn checked_out_count(&self) -> u64 {
        self.size().saturating_sub(self.available_count())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Acquires a permit within `wait`, then returns a free item (popped LIFO, so hot items stay
    /// hot and cold ones age into the idle window) or creates a fresh one.
    pub(crate) fn get(&self, wait: Wait) -> Result<UsageTrackingConnection<F::Connection>> {
        if self.is_closed() {
            return Err(Error::pool_closed());
        }

        if !self.permits.acquire(wait) {
            return Err(Error::timeout());
        }

        // Permit acquired: from here on, any early return must release it back.
        if self.is_closed() {
            self.permits.release();
            return Err(Error::pool_closed());
        }

        if let Some(item) = self.available.lock().unwrap().pop() {
            return Ok(item);
        }

        match self.factory.create() {
            Ok(item) => {
                self.size.fetch_add(1, Ordering::SeqCst);
                Ok(item)
            }
            Err(e) => {
                // Creation failed: the permit we hold must be released before propagating.
                self.permits.release();
                Err(e)
            }
        }
    }

    /// Releases `item` back to the pool, or destroys it if `prune` is set or the pool is closed.
    /// Either way, one permit is returned.
    pub(crate) fn release(&self, item: UsageTrackingConnection<F::Connection>, prune: bool) {
        if prune || self.is_closed() {
            // Ask the factory regardless of why we're here: a pool-closed destruction can still
            // be more precisely attributed to a generation/lifetime/idle staleness that happens
            // to also hold, and that classification outranks "pool closed" per priority order.
            let reason = self
                .factory
                .destroy_reason(&item, self.is_closed())
                .unwrap_or(DestroyReason::Requested);
            self.destroy(item, reason);
            return;
        }

        self.available.lock().unwrap().push(item);
        self.permits.release();
    }

    fn destroy(&self, item: UsageTrackingConnection<F::Connection>, reason: DestroyReason) {
        self.factory.close(item, reason);
        self.size.fetch_sub(1, Ordering::SeqCst);
        self.permits.release();
    }

    /// Scans `available` and destroys every item the factory judges stale, returning their
    /// permits.
    pub(crate) fn prune(&self) {
        let stale: Vec<_> = {
            let mut guard = self.available.lock().unwrap();
            let mut stale = Vec::new();
            let mut i = 0;
            while i < guard.len() {
                if self.factory.should_prune(&guard[i]) {
                    stale.push(guard.remove(i));
                } else {
                    i += 1;
                }
            }
            stale
        };

        for item in stale {
            let reason = self
                .factory
                .destroy_reason(&item, false)
                .unwrap_or(DestroyReason::Requested);
            self.destroy(item, reason);
        }
    }

    /// While `size() < n` and the pool is open, creates and pools new items. Stops the moment a
    /// permit can't be acquired non-blockingly, rather than blocking the maintenance task.
    pub(crate) fn ensure_min_size(&self, n: u32) {
        while !self.is_closed() && self.size() < n as u64 {
            if !self.permits.acquire(Wait::NonBlocking) {
                return;
            }

            match self.factory.create() {
                Ok(item) => {
                    self.size.fetch_add(1, Ordering::SeqCst);
                    self.available.lock().unwrap().push(item);
                }
                Err(_) => {
                    // Creation failed: give the permit back and stop for this tick; the caller
                    // logs and swallows this.
                    self.permits.release();
                    return;
                }
            }
        }
    }

    /// Marks the pool closed and destroys every free item. Items already checked out are
    /// destroyed by their eventual `release` call once they observe `closed`.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let drained: Vec<_> = self.available.lock().unwrap().drain(..).collect();
        for item in drained {
            let reason = self
                .factory
                .destroy_reason(&item, true)
                .unwrap_or(DestroyReason::PoolClosed);
            self.destroy(item, reason);
        }
    }
}
