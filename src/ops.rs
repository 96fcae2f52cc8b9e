//! Flavor-agnostic `send`/`recv` operations built once over the
//! `ChannelBuffer`/`BoundedBuffer` contracts, instead of being reimplemented
//! per handle type. Every handle in `crate::handles` is a thin wrapper
//! calling into these.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::core::ChannelCore;
use crate::result::{RecvError, SendError, SendTimeoutError, TryRecvError, TrySendError};
use crate::waiter::{PopWaiter, WaiterOutcome};

/// `trySend(v)`: disconnect check, then `tryPush`.
pub(crate) fn try_send<T: Send, B: ChannelBuffer<T>>(
    core: &ChannelCore<T, B>,
    value: T,
) -> Result<(), TrySendError<T>> {
    if core.lifecycle.send_disconnected() {
        return Err(TrySendError::Disconnected(value));
    }
    match core.buf.try_push(value) {
        PushOutcome::Ok => Ok(()),
        PushOutcome::Full(v) => Err(TrySendError::Full(v)),
    }
}

/// `send(v)` for buffers whose `tryPush` never reports `Full` (unbounded,
/// chunked): no slow path is needed, so this is just a disconnect-checked
/// `try_push`.
pub(crate) async fn send_infallible<T: Send, B: ChannelBuffer<T>>(
    core: &ChannelCore<T, B>,
    value: T,
) -> Result<(), SendError<T>> {
    if core.lifecycle.send_disconnected() {
        return Err(SendError::Disconnected(value));
    }
    match core.buf.try_push(value) {
        PushOutcome::Ok => Ok(()),
        PushOutcome::Full(v) => Err(SendError::Disconnected(v)),
    }
}

/// `send(v)` for bounded-style buffers: fast-path `tryPush`, else wait on
/// the buffer's sender signal and retry, re-checking disconnection on every
/// iteration of the predicate.
pub(crate) async fn send_bounded<T: Send, B: BoundedBuffer<T>>(
    core: &ChannelCore<T, B>,
    value: T,
) -> Result<(), SendError<T>> {
    if core.lifecycle.send_disconnected() {
        return Err(SendError::Disconnected(value));
    }
    let mut value = Some(value);
    core.buf
        .sender_signal()
        .wait_until(|| {
            if core.lifecycle.send_disconnected() {
                return Some(());
            }
            match core.buf.try_push(value.take().unwrap()) {
                PushOutcome::Ok => Some(()),
                PushOutcome::Full(v) => {
                    value = Some(v);
                    None
                }
            }
        })
        .await;
    match value {
        Some(v) => Err(SendError::Disconnected(v)),
        None => Ok(()),
    }
}

/// `send(v, timeout)` for bounded-style buffers: races the retrying
/// `sender_signal` predicate against `delay`. Unlike racing two whole
/// `send_bounded` futures against each other, the in-flight value lives in a
/// local the predicate closure borrows rather than one it owns, so when
/// `delay` wins the value is still here to hand back to the caller instead
/// of being silently dropped with the losing future.
pub(crate) async fn send_timeout<T: Send, B: BoundedBuffer<T>, D: Future<Output = ()>>(
    core: &ChannelCore<T, B>,
    value: T,
    delay: D,
) -> Result<(), SendTimeoutError<T>> {
    if core.lifecycle.send_disconnected() {
        return Err(SendTimeoutError::Disconnected(value));
    }
    let mut value = Some(value);
    let mut disconnected = false;
    {
        let wait = core.buf.sender_signal().wait_until(|| {
            if core.lifecycle.send_disconnected() {
                disconnected = true;
                return Some(());
            }
            match core.buf.try_push(value.take().unwrap()) {
                PushOutcome::Ok => Some(()),
                PushOutcome::Full(v) => {
                    value = Some(v);
                    None
                }
            }
        });
        futures_util::pin_mut!(wait);
        futures_util::pin_mut!(delay);
        futures_util::future::select(wait, delay).await;
    }
    match value {
        None => Ok(()),
        Some(v) if disconnected => Err(SendTimeoutError::Disconnected(v)),
        Some(v) => Err(SendTimeoutError::Timeout(v)),
    }
}

/// `tryRecv()`: disconnect check, then `tryPop`.
pub(crate) fn try_recv<T: Send, B: ChannelBuffer<T>>(
    core: &ChannelCore<T, B>,
) -> Result<T, TryRecvError> {
    match core.buf.try_pop() {
        Some(v) => Ok(v),
        None => {
            if core.lifecycle.recv_disconnected(core.buf.len_hint() == 0) {
                Err(TryRecvError::Disconnected)
            } else {
                Err(TryRecvError::Empty)
            }
        }
    }
}

/// The future returned by `recv()`.
pub(crate) struct Recv<'a, T: Send, B: ChannelBuffer<T>> {
    core: &'a ChannelCore<T, B>,
    waiter: Option<PopWaiter<T>>,
}

pub(crate) fn recv<T: Send, B: ChannelBuffer<T>>(core: &ChannelCore<T, B>) -> Recv<'_, T, B> {
    Recv { core, waiter: None }
}

impl<'a, T: Send, B: ChannelBuffer<T>> Future for Recv<'a, T, B> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.waiter.is_none() {
            if this.core.lifecycle.recv_disconnected(this.core.buf.len_hint() == 0) {
                return Poll::Ready(Err(RecvError));
            }
            this.waiter = Some(this.core.buf.add_pop_waiter());
        }
        let waiter = this.waiter.as_mut().unwrap();
        match Pin::new(waiter).poll(cx) {
            Poll::Ready(WaiterOutcome::Value(v)) => {
                this.waiter = None;
                Poll::Ready(Ok(v))
            }
            Poll::Ready(WaiterOutcome::Disconnected) => {
                this.waiter = None;
                Poll::Ready(Err(RecvError))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A cancelable receive: `.await` resolves the same way as `recv()`, except
/// [`RecvCancelable::cancel`] can be called (directly, or via a timeout
/// wrapper, or by a losing selection branch) to abandon the wait, removing
/// it from the buffer's waiter list.
pub struct RecvCancelable<T: Send> {
    state: CancelableState<T>,
}

// `state` owns `T` and a `PopWaiter<T>` directly, never pins either; movable
// regardless of whether `T` itself is `Unpin`.
impl<T: Send> Unpin for RecvCancelable<T> {}

enum CancelableState<T> {
    /// Resolved at construction time (fast-path pop, or an already-dead
    /// channel, observed synchronously). `None` once the outcome has been
    /// handed to a caller, so a second `poll` cannot double-resolve.
    Ready(Option<Result<T, crate::result::RecvTimeoutError>>),
    Waiting(PopWaiter<T>),
    Canceled,
}

pub(crate) fn recv_cancelable<T: Send, B: ChannelBuffer<T>>(
    core: &ChannelCore<T, B>,
) -> RecvCancelable<T> {
    if let Some(v) = core.buf.try_pop() {
        return RecvCancelable {
            state: CancelableState::Ready(Some(Ok(v))),
        };
    }
    if core.lifecycle.recv_disconnected(core.buf.len_hint() == 0) {
        return RecvCancelable {
            state: CancelableState::Ready(Some(Err(crate::result::RecvTimeoutError::Disconnected))),
        };
    }
    let waiter = core.buf.add_pop_waiter();
    if let PopWaiter::Ready(WaiterOutcome::Value(v)) = waiter {
        return RecvCancelable {
            state: CancelableState::Ready(Some(Ok(v))),
        };
    }
    RecvCancelable {
        state: CancelableState::Waiting(waiter),
    }
}

impl<T: Send> RecvCancelable<T> {
    /// Cancels the pending receive. Returns `true` if the cancellation raced
    /// ahead of any completion (the caller's future will resolve with
    /// `Canceled`); `false` if a value or disconnection had already arrived
    /// (the caller's future will resolve with that outcome instead, via the
    /// next `poll`).
    pub fn cancel(&mut self) -> bool {
        match &mut self.state {
            CancelableState::Ready(_) => false,
            CancelableState::Canceled => true,
            CancelableState::Waiting(waiter) => {
                if waiter.cancel() {
                    self.state = CancelableState::Canceled;
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl<T: Send> Future for RecvCancelable<T> {
    type Output = Result<T, crate::result::RecvTimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        use crate::result::RecvTimeoutError;
        let this = self.get_mut();
        match &mut this.state {
            CancelableState::Ready(outcome) => {
                Poll::Ready(outcome.take().expect("polled after completion"))
            }
            CancelableState::Canceled => Poll::Ready(Err(RecvTimeoutError::Canceled)),
            CancelableState::Waiting(waiter) => match Pin::new(waiter).poll(cx) {
                Poll::Ready(WaiterOutcome::Value(v)) => Poll::Ready(Ok(v)),
                Poll::Ready(WaiterOutcome::Disconnected) => {
                    Poll::Ready(Err(RecvTimeoutError::Disconnected))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
