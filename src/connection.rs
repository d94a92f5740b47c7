//! The pooled-item wrapper: a transport plus the bookkeeping `ConcurrentPool` and `PoolManager`
//! need to decide when it has gone stale.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::factory::InternalConnection;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Allocates the next process-wide unique connection id.
pub(crate) fn next_id() -> String {
    format!("conn-{}", NEXT_ID.fetch_add(1, Ordering::SeqCst))
}

/// A transport decorated with the usage-tracking fields the pool needs: when it was opened,
/// when it was last handed back to the pool, and which generation it belongs to.
///
/// `opened_at` is set once at construction and never changes; `last_used_at` is updated only at
/// release time, under the exclusive ownership the pool or a single [`crate::channel::PooledChannel`]
/// holds over the item at any instant.
#[derive(Debug)]
pub struct UsageTrackingConnection<C> {
    id: String,
    opened_at: u64,
    last_used_at: u64,
    generation: u64,
    transport: C,
    closed: bool,
}

impl<C: InternalConnection> UsageTrackingConnection<C> {
    pub(crate) fn new(transport: C, generation: u64, now_ms: u64) -> Self {
        Self {
            id: next_id(),
            opened_at: now_ms,
            last_used_at: now_ms,
            generation,
            transport,
            closed: false,
        }
    }

    /// The connection's stable, transport-independent identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic-ms timestamp at construction; never mutated.
    pub fn opened_at(&self) -> u64 {
        self.opened_at
    }

    /// Monotonic-ms timestamp of the last release back to the pool.
    pub fn last_used_at(&self) -> u64 {
        self.last_used_at
    }

    /// The generation this item was stamped with at creation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Updates `last_used_at`; called exactly once, at release time.
    pub(crate) fn mark_released(&mut self, now_ms: u64) {
        self.last_used_at = now_ms;
    }

    /// True once the underlying transport has observed itself closed, either explicitly or due
    /// to a transport fault.
    pub fn is_closed(&self) -> bool {
        self.closed || self.transport.is_closed()
    }

    /// Whether this item's generation is older than `current_generation` — one of the three
    /// staleness conditions a pool checks before handing an item back out.
    pub fn is_stale_generation(&self, current_generation: u64) -> bool {
        self.generation < current_generation
    }

    /// Whether `opened_at` is further than `max_life_time_ms` in the past. `max_life_time_ms ==
    /// 0` disables the check.
    pub fn is_stale_lifetime(&self, now_ms: u64, max_life_time_ms: u64) -> bool {
        max_life_time_ms != 0 && now_ms.saturating_sub(self.opened_at) > max_life_time_ms
    }

    /// Whether `last_used_at` is further than `max_idle_time_ms` in the past. `max_idle_time_ms
    /// == 0` disables the check.
    pub fn is_stale_idle(&self, now_ms: u64, max_idle_time_ms: u64) -> bool {
        max_idle_time_ms != 0 && now_ms.saturating_sub(self.last_used_at) > max_idle_time_ms
    }

    pub(crate) fn transport(&self) -> &C {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut C {
        &mut self.transport
    }

    /// Closes the underlying transport and marks this item terminal. Never transitions back.
    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.transport.close();
            self.closed = true;
        }
    }
}
