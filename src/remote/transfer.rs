//! Transferable handle payloads: the wire shape a `Sender`/`Receiver`
//! collapses to when it crosses a context boundary, per `spec.md` §6's
//! "Transferable handle payload" and §4.9's "Universal handles".
//!
//! A live handle normally dispatches through the process registry by its
//! `channel_id` (see [`crate::registry`]) when it still has a local fast
//! path, falling back to a [`super::connection::RemoteSender`]/
//! [`super::connection::RemoteReceiver`] otherwise. A [`TransferPayload`]
//! is what gets handed across the boundary instead of the handle itself: it
//! carries only a port and an optional metrics tag, never a `channel_id`,
//! because a recipient context's registry has no relationship to the
//! sender's — reconstructing a handle from a payload always sets its
//! `channel_id` to [`crate::registry::NO_LOCAL_ID`], forcing the remote
//! path.

use std::error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::control::PlatformPort;
use crate::registry::NO_LOCAL_ID;
use crate::result::Cause;

/// Error returned when a [`TransferPayload`] is packed a second time.
///
/// `spec.md` §9 leaves "the precise semantics of sending an
/// already-transferred handle payload twice" unspecified and notes that
/// "implementations may reject with Failed"; `DESIGN.md` records this
/// crate's choice.
#[derive(Debug)]
pub struct AlreadyConsumed;

impl fmt::Display for AlreadyConsumed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "transfer payload was already consumed".fmt(f)
    }
}

impl error::Error for AlreadyConsumed {}

impl From<AlreadyConsumed> for Cause {
    fn from(err: AlreadyConsumed) -> Self {
        Box::new(err)
    }
}

/// A packed, one-shot-transferable reference to a remote endpoint.
///
/// Cloning a `TransferPayload` is intentionally cheap (it is just an `Arc`
/// plus an optional tag) so that a `PlatformPort` adapter can move it
/// through a serialization boundary without this crate caring how; what it
/// guards is *consumption*, not copying — [`Self::consume`] succeeds
/// exactly once across every clone sharing the same underlying flag.
pub struct TransferPayload<T> {
    port: Arc<dyn PlatformPort<T>>,
    metrics_id: Option<Arc<str>>,
    consumed: Arc<AtomicBool>,
}

impl<T> Clone for TransferPayload<T> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
            metrics_id: self.metrics_id.clone(),
            consumed: self.consumed.clone(),
        }
    }
}

impl<T: Send + 'static> TransferPayload<T> {
    /// Packs `port` (the endpoint the recipient should address traffic to,
    /// or address its own replies through) and an optional `metrics_id` tag
    /// into a payload ready to cross a context boundary.
    pub fn pack(port: Arc<dyn PlatformPort<T>>, metrics_id: Option<Arc<str>>) -> Self {
        Self {
            port,
            metrics_id,
            consumed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Consumes the payload, reconstructing the `(port, metrics_id,
    /// channel_id)` triple a recipient-side handle is built from. The
    /// reconstructed `channel_id` is always [`NO_LOCAL_ID`]: a payload that
    /// crossed a context boundary has no standing in the recipient's own
    /// registry, so every operation on the rebuilt handle must take the
    /// remote path.
    ///
    /// Returns [`AlreadyConsumed`] if this payload (or a clone of it) was
    /// already consumed once — this crate's resolution of the open question
    /// on double-transfer, matching `DESIGN.md`.
    pub fn consume(&self) -> Result<(Arc<dyn PlatformPort<T>>, Option<Arc<str>>, usize), AlreadyConsumed> {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return Err(AlreadyConsumed);
        }
        Ok((self.port.clone(), self.metrics_id.clone(), NO_LOCAL_ID))
    }

    /// `true` once [`Self::consume`] has succeeded, on this payload or any
    /// clone sharing its underlying flag.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::control::PortMessage;
    use std::sync::Mutex;

    struct NullPort<T> {
        sent: Mutex<Vec<T>>,
    }

    impl<T: Send> PlatformPort<T> for NullPort<T> {
        fn send(&self, message: PortMessage<T>) {
            if let PortMessage::Value(v) = message {
                self.sent.lock().unwrap().push(v);
            }
        }
    }

    #[test]
    fn consume_reconstructs_with_no_local_id() {
        let port = Arc::new(NullPort::<i32> { sent: Mutex::new(Vec::new()) });
        let payload = TransferPayload::pack(port, Some(Arc::from("chan-1")));
        let (_, metrics_id, channel_id) = payload.consume().unwrap();
        assert_eq!(channel_id, NO_LOCAL_ID);
        assert_eq!(metrics_id.as_deref(), Some("chan-1"));
    }

    #[test]
    fn consuming_twice_is_rejected() {
        let port = Arc::new(NullPort::<i32> { sent: Mutex::new(Vec::new()) });
        let payload = TransferPayload::pack(port, None);
        assert!(payload.consume().is_ok());
        assert!(payload.consume().is_err());
        assert!(payload.is_consumed());
    }

    #[test]
    fn a_clone_shares_the_consumed_flag() {
        let port = Arc::new(NullPort::<i32> { sent: Mutex::new(Vec::new()) });
        let payload = TransferPayload::pack(port, None);
        let clone = payload.clone();
        assert!(payload.consume().is_ok());
        assert!(clone.consume().is_err());
    }
}
