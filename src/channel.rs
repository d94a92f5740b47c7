//! `PooledChannel` — the borrower-facing handle over a pooled transport. Enforces
//! request/response correlation, drives the generation-increment policy on transport failure, and
//! releases its item back to the pool exactly once on close.

use crate::{
    clock::Clock,
    connection::UsageTrackingConnection,
    error::{Error, Result},
    factory::{ChannelReceiveArgs, InternalConnectionFactory, InternalConnection, ResponseBuffers},
    manager::PoolManager,
};

/// A short-lived handle borrowing a single pooled item, valid from acquisition until `close`.
pub struct PooledChannel<F, Clk>
where
    F: InternalConnectionFactory,
{
    manager: PoolManager<F, Clk>,
    wrapped: Option<UsageTrackingConnection<F::Connection>>,
}

impl<F, Clk> PooledChannel<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    pub(crate) fn new(manager: PoolManager<F, Clk>, item: UsageTrackingConnection<F::Connection>) -> Self {
        Self {
            manager,
            wrapped: Some(item),
        }
    }

    fn require_open(&mut self) -> Result<&mut UsageTrackingConnection<F::Connection>> {
        if self.wrapped.as_ref().is_some_and(|item| item.is_closed()) {
            self.wrapped = None;
        }

        self.wrapped
            .as_mut()
            .ok_or_else(|| Error::precondition("operation attempted on a closed channel"))
    }

    /// Classifies a transport error and, if it's a genuine socket fault (not an interrupted
    /// read), bumps the manager's generation before the error is returned to the caller.
    fn classify_and_propagate(&self, error: Error) -> Error {
        if error.kind().bumps_generation() {
            self.manager.bump_generation();
        }
        error
    }

    /// Sends a list of already-framed message buffers. Precondition: open.
    pub fn send_message(&mut self, buffers: &[Vec<u8>]) -> Result<()> {
        let item = self.require_open()?;
        item.transport_mut()
            .send_message(buffers)
            .map_err(|e| self.classify_and_propagate(e))
    }

    /// Receives one reply and verifies its `responseTo` matches `args.request_id`.
    ///
    /// A correlation mismatch is an internal-protocol error — a bug indicator, not a transport
    /// fault — and never bumps the generation.
    pub fn receive_message(&mut self, args: &ChannelReceiveArgs) -> Result<ResponseBuffers> {
        let item = self.require_open()?;
        let reply = item
            .transport_mut()
            .receive_message()
            .map_err(|e| self.classify_and_propagate(e))?;

        if reply.response_to != args.request_id {
            return Err(Error::internal_protocol(args.request_id, reply.response_to));
        }

        if args.enforce_max_message_size {
            if let Some(max) = args.max_message_size {
                if reply.message_length > max {
                    return Err(Error::precondition(format!(
                        "reply message length {} exceeds max_message_size {}",
                        reply.message_length, max
                    )));
                }
            }
        }

        Ok(reply)
    }

    /// Asynchronous send; the callback receives the same classified result `send_message` would
    /// return, including generation classification on transport failure.
    pub fn send_message_async<Cb>(&mut self, buffers: &[Vec<u8>], callback: Cb)
    where
        Cb: FnOnce(Result<()>) + Send + 'static,
    {
        callback(self.send_message(buffers));
    }

    /// Asynchronous receive, with the same correlation and classification behavior as
    /// `receive_message`.
    pub fn receive_message_async<Cb>(&mut self, args: &ChannelReceiveArgs, callback: Cb)
    where
        Cb: FnOnce(Result<ResponseBuffers>) + Send + 'static,
    {
        callback(self.receive_message(args));
    }

    /// Idempotent close: releases the wrapped item back to the pool (destroying it if it's
    /// closed or stale), then clears `wrapped`. No-op on subsequent calls.
    pub fn close(&mut self) {
        self.release_wrapped();
    }

    fn release_wrapped(&mut self) {
        if let Some(mut item) = self.wrapped.take() {
            item.mark_released(self.manager.clock_now_ms());
            let prune = item.is_closed() || self.manager.is_item_stale(&item);
            self.manager.release(item, prune);
        }
    }

    /// True if the channel has been closed, either explicitly or because the wrapped transport
    /// reports itself closed.
    pub fn is_closed(&self) -> bool {
        match &self.wrapped {
            None => true,
            Some(item) => item.is_closed(),
        }
    }

    /// The wrapped item's stable id. Read-through; valid even after close.
    pub fn id(&self) -> Option<String> {
        self.wrapped.as_ref().map(|item| item.id().to_string())
    }

    /// The remote endpoint this channel's transport is connected to. Requires open.
    pub fn server_address(&self) -> Result<String> {
        self.wrapped
            .as_ref()
            .map(|item| item.transport().server_address())
            .ok_or_else(|| Error::precondition("operation attempted on a closed channel"))
    }
}

impl<F, Clk> Drop for PooledChannel<F, Clk>
where
    F: InternalConnectionFactory,
    Clk: Clock,
{
    fn drop(&mut self) {
        self.release_wrapped();
    }
}
