//! `ItemFactory` — wraps a caller-supplied [`InternalConnectionFactory`] with generation
//! stamping, staleness testing, and create/destroy logging.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    clock::Clock,
    connection::UsageTrackingConnection,
    factory::{Authenticator, InternalConnectionFactory},
    options::PoolSettings,
};

/// Why an item was destroyed, in priority order: a generation mismatch outranks
/// staleness-by-time, which outranks plain pool closure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestroyReason {
    /// A sibling connection observed a transport fault, bumping the generation past this item's.
    StaleGeneration,
    /// The item exceeded `max_connection_life_time_ms`.
    StaleLifetime,
    /// The item exceeded `max_connection_idle_time_ms`.
    StaleIdle,
    /// The pool was closed.
    PoolClosed,
    /// No staleness condition applied; this was a plain release-for-destruction (e.g. the
    /// transport itself reported closed).
    Requested,
}

impl DestroyReason {
    fn as_str(self) -> &'static str {
        match self {
            DestroyReason::StaleGeneration => "transport fault on sibling connection",
            DestroyReason::StaleLifetime => "exceeded max connection lifetime",
            DestroyReason::StaleIdle => "exceeded max connection idle time",
            DestroyReason::PoolClosed => "pool closed",
            DestroyReason::Requested => "requested",
        }
    }
}

/// Builds, tests, and closes [`UsageTrackingConnection`] items on behalf of a
/// [`crate::pool::ConcurrentPool`].
#[derive(Debug)]
pub(crate) struct ItemFactory<F, Clk> {
    inner: Arc<F>,
    clock: Arc<Clk>,
    generation: Arc<AtomicU64>,
    settings: PoolSettings,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl<F, Clk> Clone for ItemFactory<F, Clk> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            clock: self.clock.clone(),
            generation: self.generation.clone(),
            settings: self.settings.clone(),
            authenticator: self.authenticator.clone(),
        }
    }
}

impl<F, Clk> ItemFactory<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    pub(crate) fn new(
        inner: Arc<F>,
        clock: Arc<Clk>,
        generation: Arc<AtomicU64>,
        settings: PoolSettings,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Self {
        Self {
            inner,
            clock,
            generation,
            settings,
            authenticator,
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Obtains a raw transport from the underlying factory, authenticating it if a mechanism is
    /// configured, wraps it, and stamps it with the current generation.
    pub(crate) fn create(&self) -> crate::error::Result<UsageTrackingConnection<F::Connection>> {
        let transport = self.inner.create(self.authenticator.as_deref())?;
        let now = self.clock.now_ms();
        let generation = self.current_generation();
        let item = UsageTrackingConnection::new(transport, generation, now);

        log_create(item.id(), generation);

        Ok(item)
    }

    /// True iff the item is stale by generation, lifetime, or idle time.
    pub(crate) fn should_prune(&self, item: &UsageTrackingConnection<F::Connection>) -> bool {
        self.destroy_reason(item, false).is_some()
    }

    /// Classifies, in priority order, why `item` should be destroyed right now, or `None` if it
    /// is still healthy. `pool_closed` is checked last, after generation, lifetime, and idle.
    pub(crate) fn destroy_reason(
        &self,
        item: &UsageTrackingConnection<F::Connection>,
        pool_closed: bool,
    ) -> Option<DestroyReason> {
        let now = self.clock.now_ms();

        if item.is_stale_generation(self.current_generation()) {
            Some(DestroyReason::StaleGeneration)
        } else if item.is_stale_lifetime(now, self.settings.max_connection_life_time_ms) {
            Some(DestroyReason::StaleLifetime)
        } else if item.is_stale_idle(now, self.settings.max_connection_idle_time_ms) {
            Some(DestroyReason::StaleIdle)
        } else if pool_closed {
            Some(DestroyReason::PoolClosed)
        } else {
            None
        }
    }

    /// Closes the underlying transport and logs the reason.
    pub(crate) fn close(&self, mut item: UsageTrackingConnection<F::Connection>, reason: DestroyReason) {
        item.close();
        log_destroy(item.id(), reason);
    }
}

#[cfg(feature = "tracing-unstable")]
fn log_create(id: &str, generation: u64) {
    tracing::info!(connection.id = id, generation, "created pooled connection");
}

#[cfg(not(feature = "tracing-unstable"))]
fn log_create(_id: &str, _generation: u64) {}

#[cfg(feature = "tracing-unstable")]
fn log_destroy(id: &str, reason: DestroyReason) {
    tracing::info!(
        connection.id = id,
        reason = reason.as_str(),
        "destroyed pooled connection"
    );
}

#[cfg(not(feature = "tracing-unstable"))]
fn log_destroy(_id: &str, _reason: DestroyReason) {}
