//! Fire-and-forget remote connection: the sender just forwards values to
//! the target port, the receiver buffers whatever arrives locally with no
//! backpressure of its own. See [`super::flow_controlled`] for the
//! credit-bounded variant used once the receiver's buffer has a capacity.

use std::error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::buffer::ChannelBuffer;
use crate::buffers::unbounded::UnboundedFifo;
use crate::result::{Cause, TryRecvError};
use crate::waiter::{PopWaiter, WaiterOutcome};

use super::control::{ControlMessage, PlatformPort, PlatformReceiver, PortMessage};

/// Error reported by the remote sending half.
pub enum RemoteError<T> {
    /// The peer disconnected (an explicit `Disconnect`, or the underlying
    /// port reported closed).
    Disconnected(T),
    /// The transport failed unexpectedly.
    Failed(Cause),
}

impl<T> fmt::Debug for RemoteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Disconnected(_) => f.debug_struct("Disconnected").finish_non_exhaustive(),
            RemoteError::Failed(cause) => f.debug_tuple("Failed").field(cause).finish(),
        }
    }
}

impl<T> fmt::Display for RemoteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Disconnected(_) => "the remote connection is disconnected".fmt(f),
            RemoteError::Failed(cause) => write!(f, "remote transport failed: {cause}"),
        }
    }
}

impl<T> error::Error for RemoteError<T> {}

/// The sending half of a fire-and-forget remote connection.
pub struct RemoteSender<T> {
    port: Arc<dyn PlatformPort<T>>,
    closed: AtomicBool,
}

impl<T: Send + 'static> RemoteSender<T> {
    /// Wraps `port`, which the peer handed back (directly or via a
    /// `ConnectRecvRequest`'s `reply_port`) as where values should go.
    pub fn new(port: Arc<dyn PlatformPort<T>>) -> Self {
        Self {
            port,
            closed: AtomicBool::new(false),
        }
    }

    /// Forwards `value` to the remote peer. Never blocks: the port
    /// abstraction has no ack, so there is no backpressure to wait on here
    /// (use [`super::flow_controlled::FlowControlledSender`] for that).
    pub fn send(&self, value: T) -> Result<(), RemoteError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RemoteError::Disconnected(value));
        }
        self.port.send(PortMessage::Value(value));
        Ok(())
    }

    /// Forwards a batch of values as one `BatchMessage`, or as a single
    /// `Value` if there is only one.
    pub fn send_batch(&self, mut values: Vec<T>) -> Result<(), RemoteError<Vec<T>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RemoteError::Disconnected(values));
        }
        if values.len() == 1 {
            self.port.send(PortMessage::Value(values.pop().unwrap()));
        } else {
            self.port.send(PortMessage::Batch(values));
        }
        Ok(())
    }

    /// Tells the peer this side is going away. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.port.send(PortMessage::Control(ControlMessage::Disconnect));
        }
    }

    /// Returns `true` once [`Self::close`] has run (or the peer was
    /// observed disconnected).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The receiving half of a fire-and-forget remote connection: an unbounded
/// local buffer fed by [`drive`].
pub struct RemoteReceiver<T> {
    buf: UnboundedFifo<T>,
    closed: AtomicBool,
}

impl<T: Send + 'static> RemoteReceiver<T> {
    fn new() -> Self {
        Self {
            buf: UnboundedFifo::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Receives a value without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.buf.try_pop() {
            Some(v) => Ok(v),
            None if self.closed.load(Ordering::Acquire) => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Receives the next value, waiting if none has arrived yet.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv {
            receiver: self,
            waiter: None,
        }
    }

    /// Returns `true` once the peer has disconnected and the buffer is
    /// drained.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) && self.buf.len_hint() == 0
    }
}

/// The future returned by [`RemoteReceiver::recv`].
pub struct Recv<'a, T: Send + 'static> {
    receiver: &'a RemoteReceiver<T>,
    waiter: Option<PopWaiter<T>>,
}

impl<'a, T: Send + 'static> Unpin for Recv<'a, T> {}

impl<'a, T: Send + 'static> Future for Recv<'a, T> {
    type Output = Result<T, TryRecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.waiter.is_none() {
            if this.receiver.closed.load(Ordering::Acquire) && this.receiver.buf.len_hint() == 0 {
                return Poll::Ready(Err(TryRecvError::Disconnected));
            }
            this.waiter = Some(this.receiver.buf.add_pop_waiter());
        }
        let waiter = this.waiter.as_mut().unwrap();
        match Pin::new(waiter).poll(cx) {
            Poll::Ready(WaiterOutcome::Value(v)) => {
                this.waiter = None;
                Poll::Ready(Ok(v))
            }
            Poll::Ready(WaiterOutcome::Disconnected) => {
                this.waiter = None;
                Poll::Ready(Err(TryRecvError::Disconnected))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Opens a fire-and-forget receiving connection: sends the
/// `ConnectRecvRequest` handshake over `sender_port`, then returns a
/// `RemoteReceiver` plus the future that must be polled (typically
/// spawned) to actually drive incoming messages into it.
pub fn connect_receiver<T, R>(
    sender_port: Arc<dyn PlatformPort<T>>,
    reply: R,
) -> (Arc<RemoteReceiver<T>>, impl Future<Output = ()>)
where
    T: Send + 'static,
    R: PlatformReceiver<T> + 'static,
{
    let receiver = Arc::new(RemoteReceiver::new());
    let reply_port = reply.reply_port();
    sender_port.send(PortMessage::Control(ControlMessage::ConnectRecvRequest {
        reply_port,
        initial_credits: 0,
    }));
    (receiver.clone(), drive(reply, receiver))
}

/// Polls `reply` to completion, feeding every incoming value (or batch)
/// into `receiver`'s local buffer, until a `Disconnect` control message or
/// the port itself closes.
pub async fn drive<T: Send + 'static>(mut reply: impl PlatformReceiver<T>, receiver: Arc<RemoteReceiver<T>>) {
    loop {
        let next = std::future::poll_fn(|cx| reply.poll_message(cx)).await;
        match next {
            Some(PortMessage::Value(v)) => {
                let _ = receiver.buf.try_push(v);
            }
            Some(PortMessage::Batch(values)) => {
                for v in values {
                    let _ = receiver.buf.try_push(v);
                }
            }
            Some(PortMessage::Control(ControlMessage::Disconnect)) | None => {
                receiver.closed.store(true, Ordering::Release);
                receiver.buf.fail_all_pop_waiters();
                reply.close();
                return;
            }
            // `ConnectOk`/`FlowCredit`/connect requests arriving on the
            // plain data port are not meaningful here; the flow-controlled
            // variant handles `FlowCredit` on its own dedicated port.
            Some(PortMessage::Control(_)) => {}
        }
    }
}
