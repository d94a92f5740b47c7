//! Contains the `Error` and `Result` types that `pooled_channel` uses.

use std::{fmt, sync::Arc};

use thiserror::Error;

/// The result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while acquiring, using, or releasing a pooled channel.
///
/// The inner [`ErrorKind`] is wrapped so that `Error` stays small and cheap to move around; match
/// on [`Error::kind`] to inspect the specific failure.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: Arc<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    /// The specific kind of failure that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn pool_closed() -> Self {
        Self::new(ErrorKind::PoolClosed)
    }

    pub(crate) fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    pub(crate) fn wait_queue_full() -> Self {
        Self::new(ErrorKind::WaitQueueFull)
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition {
            message: message.into(),
        })
    }

    pub(crate) fn internal_protocol(expected: i32, actual: i32) -> Self {
        Self::new(ErrorKind::InternalProtocol { expected, actual })
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// The specific kind of failure behind an [`Error`].
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pool (or the manager that owns it) has been closed; no further channels can be
    /// acquired.
    #[error("connection pool is closed")]
    PoolClosed,

    /// The acquisition deadline elapsed before a usable item became available.
    #[error("timed out waiting for a pooled connection")]
    Timeout,

    /// Admission was denied because the wait queue was already at capacity.
    #[error("wait queue is full")]
    WaitQueueFull,

    /// A transport-level failure occurred while using a connection.
    #[error("transport error: {kind}")]
    Transport {
        /// The sub-classification of the failure, used to decide whether the pool's generation
        /// should be bumped.
        kind: TransportErrorKind,
        /// The underlying cause, if the transport implementation supplied one.
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// A reply's `responseTo` did not match the id of the request it was read for. This
    /// indicates a protocol-level bug, not a broken transport, so it never bumps the
    /// generation.
    #[error("internal protocol error: expected responseTo {expected}, got {actual}")]
    InternalProtocol {
        /// The request id that was sent.
        expected: i32,
        /// The `responseTo` actually found on the reply.
        actual: i32,
    },

    /// Authentication failed while establishing a new raw connection.
    #[error("security error during connection setup: {message}")]
    Security {
        /// A human-readable description supplied by the authenticator.
        message: String,
    },

    /// An operation was attempted that violates a documented precondition (operating on a closed
    /// channel, an invalid configuration value, etc).
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the violated precondition.
        message: String,
    },
}

/// Distinguishes a true broken-wire transport failure from a cancellation-driven interrupted
/// read. Only [`TransportErrorKind::Other`] bumps a pool's generation; an interrupted read is
/// attributed to cancellation of the caller, not a fault in the transport itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The read was interrupted by cancellation rather than a socket fault.
    InterruptedRead,
    /// Any other transport failure (connection reset, write failure, EOF, etc).
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::InterruptedRead => write!(f, "interrupted read"),
            TransportErrorKind::Other => write!(f, "socket error"),
        }
    }
}

impl ErrorKind {
    /// Builds a generic (non-interrupted) transport error wrapping an arbitrary cause.
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ErrorKind::Transport {
            kind: TransportErrorKind::Other,
            source: Some(Arc::new(source)),
        }
    }

    /// Builds an interrupted-read transport error.
    pub fn interrupted_read() -> Self {
        ErrorKind::Transport {
            kind: TransportErrorKind::InterruptedRead,
            source: None,
        }
    }

    /// True if this error should trigger a generation bump when observed by a
    /// [`crate::channel::PooledChannel`].
    pub(crate) fn bumps_generation(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport {
                kind: TransportErrorKind::Other,
                ..
            }
        )
    }
}
