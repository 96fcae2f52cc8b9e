//! Result sum types returned by channel operations.
//!
//! No panics cross a channel boundary on the happy path: every failure mode
//! named in the component design is an explicit variant here rather than a
//! thrown exception, and `Failed` is the only variant that boxes an
//! underlying cause (an unexpected error surfacing from the remote
//! transport, or from a user `on_drop`/branch-body callback).

use std::error;
use std::fmt;

/// A boxed, type-erased cause wrapped by the `Failed` variants.
pub type Cause = Box<dyn error::Error + Send + Sync + 'static>;

/// Error returned by a non-blocking `try_send`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrySendError<T> {
    /// The buffer has no space for the value right now (bounded, SRSW,
    /// rendezvous with no waiting popper, or an already-set promise).
    Full(T),
    /// No live receiver remains, or the channel was closed explicitly.
    Disconnected(T),
}

impl<T> TrySendError<T> {
    /// Extracts the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Disconnected(v) => v,
        }
    }

    /// Returns `true` if the failure was due to a full buffer rather than
    /// disconnection.
    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }
}

impl<T: fmt::Debug> error::Error for TrySendError<T> {}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => "sending into a full channel".fmt(f),
            TrySendError::Disconnected(_) => "sending into a disconnected channel".fmt(f),
        }
    }
}

/// Error returned by the asynchronous `send`.
pub enum SendError<T> {
    /// No live receiver remains.
    Disconnected(T),
    /// The remote transport failed unexpectedly.
    Failed(Cause),
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected(_) => f.debug_struct("Disconnected").finish_non_exhaustive(),
            SendError::Failed(cause) => f.debug_tuple("Failed").field(cause).finish(),
        }
    }
}

impl<T> error::Error for SendError<T> {}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected(_) => "sending into a disconnected channel".fmt(f),
            SendError::Failed(cause) => write!(f, "send failed: {cause}"),
        }
    }
}

/// Error returned by a timeout-decorated send.
pub enum SendTimeoutError<T> {
    /// The timeout elapsed before space (or a receiver) became available.
    Timeout(T),
    /// No live receiver remains.
    Disconnected(T),
    /// The remote transport failed unexpectedly.
    Failed(Cause),
}

impl<T> fmt::Debug for SendTimeoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendTimeoutError::Timeout(_) => f.debug_struct("Timeout").finish_non_exhaustive(),
            SendTimeoutError::Disconnected(_) => {
                f.debug_struct("Disconnected").finish_non_exhaustive()
            }
            SendTimeoutError::Failed(cause) => f.debug_tuple("Failed").field(cause).finish(),
        }
    }
}

impl<T> error::Error for SendTimeoutError<T> {}

impl<T> fmt::Display for SendTimeoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendTimeoutError::Timeout(_) => "timed out sending into the channel".fmt(f),
            SendTimeoutError::Disconnected(_) => "sending into a disconnected channel".fmt(f),
            SendTimeoutError::Failed(cause) => write!(f, "send failed: {cause}"),
        }
    }
}

/// Error returned by a non-blocking `try_recv`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TryRecvError {
    /// The buffer currently holds nothing.
    Empty,
    /// No live sender remains and the buffer is drained.
    Disconnected,
}

impl error::Error for TryRecvError {}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => "receiving from an empty channel".fmt(f),
            TryRecvError::Disconnected => "receiving from a disconnected channel".fmt(f),
        }
    }
}

/// Error returned by the asynchronous `recv`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecvError;

impl error::Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "receiving from a disconnected channel".fmt(f)
    }
}

/// Error returned when a cancelable operation is canceled before completion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CanceledError;

impl error::Error for CanceledError {}

impl fmt::Display for CanceledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "the receive was canceled".fmt(f)
    }
}

/// Error returned by a timeout-decorated or cancelable receive.
#[derive(Debug)]
pub enum RecvTimeoutError {
    /// The timeout elapsed before a value arrived.
    Timeout,
    /// No live sender remains and the buffer is drained.
    Disconnected,
    /// The receive was explicitly canceled.
    Canceled,
    /// The remote transport failed unexpectedly.
    Failed(Cause),
}

impl error::Error for RecvTimeoutError {}

impl fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvTimeoutError::Timeout => "timed out receiving from the channel".fmt(f),
            RecvTimeoutError::Disconnected => "receiving from a disconnected channel".fmt(f),
            RecvTimeoutError::Canceled => "the receive was canceled".fmt(f),
            RecvTimeoutError::Failed(cause) => write!(f, "receive failed: {cause}"),
        }
    }
}
