//! The `Sender`/`Receiver` pair shared by every flavor whose buffer
//! implements [`BoundedBuffer`] — spsc, mpsc, mpmc, and (non-blocking only)
//! one-shot. Broadcast is excluded: its receive operation is parameterized
//! by a per-subscriber cursor rather than a plain pop, so it gets its own
//! pair in `handles::broadcast`.
//!
//! Every buffer flavor that reaches this module implements `BoundedBuffer`
//! even when nothing can ever actually park a sender (unbounded, chunked,
//! latest-only carry a `sender_signal` that is simply never notified) — see
//! each buffer's own doc comment. That lets `send` be written once, here,
//! instead of forked per flavor into a blocking and a non-blocking variant.
//!
//! Flavor modules (`spsc`, `mpsc`, `mpmc`) wrap this pair in their own named
//! types and decide which of `Clone`/multi-subscription to expose, exposing
//! each flavor's capability set through its own interface facet rather than
//! one maximal type.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::buffer::BoundedBuffer;
use crate::core::ChannelCore;
use crate::ops;
use crate::result::{RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError};

pub(crate) struct Sender<T: Send + 'static, B: BoundedBuffer<T> + 'static> {
    core: Arc<ChannelCore<T, B>>,
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> Sender<T, B> {
    pub(crate) fn new(core: Arc<ChannelCore<T, B>>) -> Self {
        Self { core }
    }

    pub(crate) fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        ops::try_send(&self.core, value)
    }

    pub(crate) async fn send(&self, value: T) -> Result<(), SendError<T>> {
        ops::send_bounded(&self.core, value).await
    }

    /// Races the retrying `sender_signal` predicate against an externally
    /// supplied delay future — the timer itself is an external collaborator
    /// this crate does not own, so the caller brings whatever
    /// `Future<Output = ()>` its runtime provides. Unlike racing two whole
    /// `send` futures, this
    /// keeps the in-flight value in a local the predicate only borrows, so a
    /// losing delay still hands the original value back instead of losing it
    /// with the dropped `send` future.
    pub(crate) async fn send_timeout<D: Future<Output = ()>>(
        &self,
        value: T,
        delay: D,
    ) -> Result<(), SendTimeoutError<T>> {
        ops::send_timeout(&self.core, value, delay).await
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.core.lifecycle.is_closed_senders() || self.core.lifecycle.active_receivers() == 0
    }

    pub(crate) fn close(&self) {
        self.core.close_sender_side();
    }

    /// Registers one more live sender sharing this core, for flavors that
    /// expose `Clone`.
    pub(crate) fn clone_handle(&self) -> Self {
        self.core.lifecycle.clone_sender();
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> Drop for Sender<T, B> {
    fn drop(&mut self) {
        self.core.release_sender();
    }
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> fmt::Debug for Sender<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

pub(crate) struct Receiver<T: Send + 'static, B: BoundedBuffer<T> + 'static> {
    core: Arc<ChannelCore<T, B>>,
    /// The in-flight receive backing [`Stream::poll_next`], kept across
    /// calls instead of rebuilt per poll: a freshly constructed future
    /// registers a pop-waiter and is then dropped at the end of the
    /// function, which immediately cancels that registration (see the
    /// `Drop` impls in `crate::waiter`) and silently discards the wakeup the
    /// caller was told to expect.
    stream_recv: Option<ops::RecvCancelable<T>>,
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> Receiver<T, B> {
    pub(crate) fn new(core: Arc<ChannelCore<T, B>>) -> Self {
        Self {
            core,
            stream_recv: None,
        }
    }

    pub(crate) fn try_recv(&mut self) -> Result<T, TryRecvError> {
        ops::try_recv(&self.core)
    }

    pub(crate) async fn recv(&mut self) -> Result<T, RecvError> {
        ops::recv(&self.core).await
    }

    /// Returns a future that resolves the same way `recv` does, plus a
    /// canceler that removes the pending wait; cancellation is a no-op if a
    /// value had already arrived.
    pub(crate) fn recv_cancelable(&mut self) -> ops::RecvCancelable<T> {
        ops::recv_cancelable(&self.core)
    }

    pub(crate) async fn recv_timeout<D: Future<Output = ()>>(
        &mut self,
        delay: D,
    ) -> Result<T, RecvTimeoutError> {
        let mut fut = self.recv_cancelable();
        futures_util::pin_mut!(delay);
        futures_util::future::poll_fn(|cx| match Pin::new(&mut fut).poll(cx) {
            Poll::Ready(v) => Poll::Ready(v),
            Poll::Pending => match delay.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    fut.cancel();
                    // The cancel may have raced a completion; poll once more
                    // to retrieve whichever outcome actually won.
                    match Pin::new(&mut fut).poll(cx) {
                        Poll::Ready(Ok(v)) => Poll::Ready(Ok(v)),
                        Poll::Ready(Err(RecvTimeoutError::Canceled)) => {
                            Poll::Ready(Err(RecvTimeoutError::Timeout))
                        }
                        Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                        Poll::Pending => Poll::Ready(Err(RecvTimeoutError::Timeout)),
                    }
                }
                Poll::Pending => Poll::Pending,
            },
        })
        .await
    }

    pub(crate) fn try_recv_many(&mut self, max: usize) -> Vec<T> {
        self.core.buf.try_pop_many(max)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.core.lifecycle.is_closed_receivers()
    }

    pub(crate) fn close(&self) {
        self.core.close_receiver_side();
    }

    /// Registers one more live receiver handle sharing this core, for
    /// flavors that expose `Clone` (mpmc).
    pub(crate) fn clone_handle(&self) -> Self {
        self.core.lifecycle.clone_receiver();
        Self {
            core: self.core.clone(),
            stream_recv: None,
        }
    }
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> Drop for Receiver<T, B> {
    fn drop(&mut self) {
        self.core.release_receiver();
    }
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> fmt::Debug for Receiver<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T: Send + 'static, B: BoundedBuffer<T> + 'static> Stream for Receiver<T, B> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.stream_recv.is_none() {
            this.stream_recv = Some(ops::recv_cancelable(&this.core));
        }
        let fut = this.stream_recv.as_mut().unwrap();
        match Pin::new(fut).poll(cx) {
            Poll::Ready(outcome) => {
                this.stream_recv = None;
                match outcome {
                    Ok(v) => Poll::Ready(Some(v)),
                    Err(_) => Poll::Ready(None),
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
