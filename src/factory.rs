//! External collaborators: the raw transport, the thing that builds one, and the authentication
//! capability invoked while doing so. None of these are implemented in this crate — socket I/O,
//! framing, and SASL/GSSAPI handshakes are the caller's concern, not this pool's.

use std::fmt;

use crate::error::Result;

/// A single already-open, already-authenticated transport capable of exchanging framed messages
/// with the remote endpoint.
///
/// Implementations own the raw socket (or whatever underlies it) and are responsible for framing;
/// this crate only ever sees byte buffers in and byte buffers out.
pub trait InternalConnection: Send + fmt::Debug {
    /// Sends a list of already-framed message buffers.
    fn send_message(&mut self, buffers: &[Vec<u8>]) -> Result<()>;

    /// Receives one framed reply, returning its correlation id (`responseTo`) and payload.
    fn receive_message(&mut self) -> Result<ResponseBuffers>;

    /// Closes the underlying transport. Idempotent.
    fn close(&mut self);

    /// Whether the transport has been closed, either explicitly or because of an observed
    /// fault.
    fn is_closed(&self) -> bool;

    /// A transport-assigned identifier, read-through for diagnostics.
    fn id(&self) -> String;

    /// The remote endpoint this transport is connected to.
    fn server_address(&self) -> String;
}

/// A fully-read, correlated reply.
#[derive(Clone, Debug)]
pub struct ResponseBuffers {
    /// The request id this reply is a response to.
    pub response_to: i32,
    /// Total on-wire length of the message, including its header.
    pub message_length: u32,
    /// The framed reply payload.
    pub payload: Vec<u8>,
}

/// Arguments controlling a single `receive_message` call.
#[derive(Clone, Debug)]
pub struct ChannelReceiveArgs {
    /// The request id the reply must carry in its `responseTo` field.
    pub request_id: i32,
    /// An optional cap on `message_length`. Only enforced when
    /// `enforce_max_message_size` is set; present but disabled by default.
    pub max_message_size: Option<u32>,
    /// Whether to enforce `max_message_size` against the reply's `message_length`.
    pub enforce_max_message_size: bool,
}

impl ChannelReceiveArgs {
    /// Convenience constructor for the common case: just correlate on `request_id`, no size cap.
    pub fn for_request(request_id: i32) -> Self {
        Self {
            request_id,
            max_message_size: None,
            enforce_max_message_size: false,
        }
    }
}

/// A capability that authenticates a freshly-opened raw connection.
///
/// Each mechanism (GSSAPI, PLAIN, SCRAM, ...) implements this trait with its own credentials
/// rather than deriving from a shared base class.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// The name of the mechanism this authenticator implements, for logging.
    fn mechanism_name(&self) -> &str;

    /// Runs the handshake against a freshly-opened connection.
    fn authenticate(&self, connection: &mut dyn InternalConnection) -> Result<()>;
}

/// Opens fresh raw connections to a single remote endpoint, optionally authenticating them.
///
/// Credential and server-address configuration, and the concrete socket dial, live entirely in
/// the implementation a caller supplies.
pub trait InternalConnectionFactory: Send + Sync + fmt::Debug {
    /// The concrete connection type this factory produces.
    type Connection: InternalConnection + 'static;

    /// Opens a new connection, running `authenticator`'s handshake against it before returning
    /// if one was configured for the pool.
    fn create(&self, authenticator: Option<&dyn Authenticator>) -> Result<Self::Connection>;
}
