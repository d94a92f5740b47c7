//! `PoolManager` — bounded acquisition with wait-queue admission control, the generation counter
//! that retires whole cohorts of items on transport failure, and the maintenance scheduler.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    channel::PooledChannel,
    clock::{Clock, SystemClock},
    error::{Error, Result},
    factory::{Authenticator, InternalConnectionFactory},
    item_factory::ItemFactory,
    maintenance::PeriodicTask,
    options::PoolSettings,
    pool::ConcurrentPool,
    semaphore::Wait,
    stats::{NoopObserver, NoopRegistry, ObserverRegistry, PoolStatisticsObserver, PoolStatisticsSnapshot},
};

/// The stable name a `PoolManager` registers its statistics observer under.
const STATISTICS_OBSERVER_NAME: &str = "pooled-channel.pool-manager";

/// Shared state a `PoolManager`'s `Clone`s and its `PooledChannel`s all reference.
struct Inner<F, Clk>
where
    F: InternalConnectionFactory,
{
    generation: Arc<AtomicU64>,
    wait_queue_size: AtomicU64,
    pool: ConcurrentPool<F, Clk>,
    clock: Arc<Clk>,
    settings: PoolSettings,
    closed: std::sync::atomic::AtomicBool,
    maintenance: Mutex<Option<PeriodicTask>>,
    registry: Arc<dyn ObserverRegistry>,
}

/// The connection pool manager: a `ChannelProvider` that admits callers against a wait-queue cap,
/// retries stale items transparently, and retires whole cohorts of items via its generation
/// counter.
pub struct PoolManager<F, Clk = SystemClock>
where
    F: InternalConnectionFactory,
{
    inner: Arc<Inner<F, Clk>>,
}

impl<F, Clk> Clone for PoolManager<F, Clk>
where
    F: InternalConnectionFactory,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F> PoolManager<F, SystemClock>
where
    F: InternalConnectionFactory,
{
    /// Constructs a manager backed by the system clock, no authenticator, and no statistics
    /// observer.
    pub fn new(factory: F, settings: PoolSettings) -> Result<Self> {
        Self::with_clock_and_observer(
            factory,
            settings,
            Arc::new(SystemClock::default()),
            None,
            None,
            Arc::new(NoopRegistry),
        )
    }

    /// Constructs a manager backed by the system clock and no statistics observer, running
    /// `authenticator`'s handshake against every freshly-opened connection.
    pub fn with_authenticator(
        factory: F,
        settings: PoolSettings,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        Self::with_clock_and_observer(
            factory,
            settings,
            Arc::new(SystemClock::default()),
            Some(authenticator),
            None,
            Arc::new(NoopRegistry),
        )
    }
}

impl<F, Clk> PoolManager<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    /// Constructs a manager with an explicit clock (for deterministic tests), an optional
    /// authenticator run against every freshly-opened connection, and/or statistics observer.
    pub fn with_clock_and_observer(
        factory: F,
        settings: PoolSettings,
        clock: Arc<Clk>,
        authenticator: Option<Arc<dyn Authenticator>>,
        observer: Option<Arc<dyn PoolStatisticsObserver>>,
        registry: Arc<dyn ObserverRegistry>,
    ) -> Result<Self> {
        settings.validate()?;

        let generation = Arc::new(AtomicU64::new(0));
        let item_factory = ItemFactory::new(
            Arc::new(factory),
            clock.clone(),
            generation.clone(),
            settings.clone(),
            authenticator,
        );
        let pool = ConcurrentPool::new(settings.max_size, item_factory);

        registry.register(
            STATISTICS_OBSERVER_NAME,
            observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        );

        let inner = Arc::new(Inner {
            generation,
            wait_queue_size: AtomicU64::new(0),
            pool,
            clock,
            settings,
            closed: std::sync::atomic::AtomicBool::new(false),
            maintenance: Mutex::new(None),
            registry,
        });

        if inner.settings.maintenance_enabled() {
            let maintenance_inner = inner.clone();
            let task = PeriodicTask::start(
                Duration::from_millis(inner.settings.maintenance_frequency_ms),
                Duration::from_millis(inner.settings.maintenance_initial_delay_ms),
                move || maintenance_inner.run_maintenance(),
            );
            *inner.maintenance.lock().unwrap() = Some(task);
        }

        Ok(Self { inner })
    }

    /// The generation currently in effect. Monotonically non-decreasing.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Bumps the generation by one, retiring every item from the previous cohort. Items are not
    /// eagerly removed; the next release or acquisition of each discovers it's stale and destroys
    /// it.
    pub(crate) fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "tracing-unstable")]
        tracing::warn!(
            generation = self.generation(),
            "transport fault observed; pool generation bumped"
        );
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Acquires a channel, using `settings.max_wait_time_ms` as the default timeout.
    pub fn get(&self) -> Result<PooledChannel<F, Clk>> {
        self.get_with_timeout_ms(self.inner.settings.max_wait_time_ms)
    }

    /// Acquires a channel with an explicit timeout in milliseconds (`None` means indefinite).
    pub fn get_with_timeout_ms(&self, timeout_ms: Option<u64>) -> Result<PooledChannel<F, Clk>> {
        if self.is_closed() {
            return Err(Error::pool_closed());
        }

        let waiters = self.inner.wait_queue_size.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.acquire(timeout_ms, waiters);
        self.inner.wait_queue_size.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn acquire(&self, timeout_ms: Option<u64>, waiters: u64) -> Result<PooledChannel<F, Clk>> {
        if waiters > self.inner.settings.max_wait_queue_size as u64 {
            return Err(Error::wait_queue_full());
        }

        // `Some(0)` means non-blocking (try once, don't wait for a permit); it is not a
        // zero-length deadline, which would always already be elapsed.
        let non_blocking = timeout_ms == Some(0);
        let deadline = if non_blocking {
            None
        } else {
            timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms))
        };
        let current_generation = self.generation();

        loop {
            if self.is_closed() {
                return Err(Error::pool_closed());
            }

            let remaining_wait = if non_blocking {
                Wait::NonBlocking
            } else {
                match deadline {
                    None => Wait::Indefinite,
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(Error::timeout());
                        }
                        Wait::from_millis_signed((deadline - now).as_millis() as i64)
                    }
                }
            };

            let item = self.inner.pool.get(remaining_wait)?;

            let now_ms = self.inner.clock.now_ms();
            let stale = item.is_stale_generation(current_generation)
                || item.is_stale_lifetime(now_ms, self.inner.settings.max_connection_life_time_ms)
                || item.is_stale_idle(now_ms, self.inner.settings.max_connection_idle_time_ms);

            if stale {
                self.inner.pool.release(item, true);
                continue;
            }

            return Ok(PooledChannel::new(self.clone(), item));
        }
    }

    /// Releases an item back to the underlying pool; called by `PooledChannel::close`.
    pub(crate) fn release(&self, item: crate::connection::UsageTrackingConnection<F::Connection>, prune: bool) {
        self.inner.pool.release(item, prune);
    }

    /// The manager's clock reading, used by `PooledChannel` to stamp `last_used_at` on release.
    pub(crate) fn clock_now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Whether `item` is stale by generation, lifetime, or idle time, per the same test used at
    /// acquisition.
    pub(crate) fn is_item_stale(&self, item: &crate::connection::UsageTrackingConnection<F::Connection>) -> bool {
        let now_ms = self.inner.clock.now_ms();
        item.is_stale_generation(self.generation())
            || item.is_stale_lifetime(now_ms, self.inner.settings.max_connection_life_time_ms)
            || item.is_stale_idle(now_ms, self.inner.settings.max_connection_idle_time_ms)
    }

    /// Runs the maintenance task body synchronously on the caller: prune, then replenish to
    /// `min_size`. Exposed for tests and manual triggers.
    pub fn do_maintenance(&self) {
        self.inner.run_maintenance();
    }

    /// A read-only snapshot of the manager's current statistics.
    pub fn statistics(&self) -> PoolStatisticsSnapshot {
        self.inner.statistics()
    }

    /// Closes the manager: closes the pool (destroying every free item; checked-out items are
    /// destroyed on release), cancels maintenance, and unregisters the statistics observer.
    /// Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut task) = self.inner.maintenance.lock().unwrap().take() {
            task.cancel();
        }

        self.inner.pool.close();
        self.inner.registry.unregister(STATISTICS_OBSERVER_NAME);
    }
}

impl<F, Clk> Inner<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    fn run_maintenance(&self) {
        #[cfg(feature = "tracing-unstable")]
        tracing::trace!("running pool maintenance");

        if self.settings.pruning_enabled() {
            #[cfg(feature = "tracing-unstable")]
            tracing::debug!("pruning idle/expired connections");
            self.pool.prune();
        }

        if self.settings.min_size > 0 {
            #[cfg(feature = "tracing-unstable")]
            tracing::debug!(min_size = self.settings.min_size, "replenishing pool to min_size");
            self.pool.ensure_min_size(self.settings.min_size);
        }
    }

    fn statistics(&self) -> PoolStatisticsSnapshot {
        PoolStatisticsSnapshot {
            size: self.pool.size(),
            checked_out_count: self.pool.checked_out_count(),
            wait_queue_size: self.wait_queue_size.load(Ordering::SeqCst),
            min_size: self.settings.min_size,
            max_size: self.settings.max_size,
        }
    }
}

impl<F, Clk> Drop for Inner<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    /// Safety net: if the manager is dropped without an explicit `close()`, the pool's free items
    /// are still closed rather than leaked. The maintenance task cancels itself via
    /// `PeriodicTask`'s own `Drop`.
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close();
            self.registry.unregister(STATISTICS_OBSERVER_NAME);
        }
    }
}
