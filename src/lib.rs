//! Core of a client-side connection pool for a network database driver transport.
//!
//! This crate provides a pooled-channel provider that manages a bounded set of long-lived
//! connections to a single remote endpoint, multiplexes caller requests onto them, and
//! invalidates them en masse when transport-level faults are observed. It deliberately does not
//! implement authentication, socket I/O/framing, telemetry publication, or wire-protocol message
//! construction — those are external collaborators expressed here as traits
//! ([`factory::Authenticator`], [`factory::InternalConnectionFactory`],
//! [`factory::InternalConnection`], [`stats::ObserverRegistry`]) that a caller supplies.
//!
//! The two central types are [`manager::PoolManager`] (bounded acquisition, admission control,
//! maintenance, generation-based cohort invalidation) and [`channel::PooledChannel`] (the
//! borrower-facing handle that enforces request/response correlation and drives the
//! generation-bump policy on transport failure).
#![warn(missing_docs)]

mod channel;
mod clock;
mod connection;
mod error;
mod factory;
mod item_factory;
mod maintenance;
mod manager;
mod options;
mod pool;
mod semaphore;
mod stats;

pub use channel::PooledChannel;
pub use clock::{Clock, FakeClock, SystemClock};
pub use connection::UsageTrackingConnection;
pub use error::{Error, ErrorKind, Result, TransportErrorKind};
pub use factory::{
    Authenticator, ChannelReceiveArgs, InternalConnection, InternalConnectionFactory, ResponseBuffers,
};
pub use manager::PoolManager;
pub use options::PoolSettings;
pub use stats::{NoopObserver, NoopRegistry, ObserverRegistry, PoolStatisticsObserver, PoolStatisticsSnapshot};

/// The caller-facing surface of a [`PoolManager`]: acquire and release channels, and shut the
/// pool down. Implemented by [`PoolManager`] itself; spelled out as a trait so callers can depend
/// on it rather than a concrete manager type.
pub trait ChannelProvider {
    /// The borrowed-channel type this provider hands out.
    type Channel;

    /// Acquires a channel using the provider's configured default timeout.
    fn get(&self) -> Result<Self::Channel>;

    /// Acquires a channel, overriding the default timeout (`None` waits indefinitely).
    fn get_with_timeout_ms(&self, timeout_ms: Option<u64>) -> Result<Self::Channel>;

    /// Closes the provider. Idempotent; every subsequent `get` fails with
    /// [`ErrorKind::PoolClosed`].
    fn close(&self);
}

impl<F, Clk> ChannelProvider for PoolManager<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    type Channel = PooledChannel<F, Clk>;

    fn get(&self) -> Result<Self::Channel> {
        PoolManager::get(self)
    }

    fn get_with_timeout_ms(&self, timeout_ms: Option<u64>) -> Result<Self::Channel> {
        PoolManager::get_with_timeout_ms(self, timeout_ms)
    }

    fn close(&self) {
        PoolManager::close(self)
    }
}

/// The borrower-facing contract over a pooled transport: send/receive with request/response
/// correlation, idempotent close. Implemented by [`PooledChannel`].
pub trait Channel {
    /// Sends a list of already-framed message buffers.
    fn send_message(&mut self, buffers: &[Vec<u8>]) -> Result<()>;

    /// Receives one reply and verifies its correlation id.
    fn receive_message(&mut self, args: &ChannelReceiveArgs) -> Result<ResponseBuffers>;

    /// Idempotent close.
    fn close(&mut self);

    /// True once closed.
    fn is_closed(&self) -> bool;

    /// The wrapped item's stable id, if still open (or was open before close).
    fn id(&self) -> Option<String>;
}

impl<F, Clk> Channel for PooledChannel<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    fn send_message(&mut self, buffers: &[Vec<u8>]) -> Result<()> {
        PooledChannel::send_message(self, buffers)
    }

    fn receive_message(&mut self, args: &ChannelReceiveArgs) -> Result<ResponseBuffers> {
        PooledChannel::receive_message(self, args)
    }

    fn close(&mut self) {
        PooledChannel::close(self)
    }

    fn is_closed(&self) -> bool {
        PooledChannel::is_closed(self)
    }

    fn id(&self) -> Option<String> {
        PooledChannel::id(self)
    }
}
