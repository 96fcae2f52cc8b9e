//! One-shot channel: a single value, sent (at most) once.
//!
//! Backed by [`PromiseBuffer`], which supports both the usual
//! `consume_once = true` semantics (a second `recv` sees `Disconnected`) and
//! a `consume_once = false` mode where every `recv` observes the stored
//! value until the sender closes; both observation modes are load-bearing.
//! Neither `Sender` nor `Receiver` is `Clone`: a promise has exactly one
//! producer and one consumer by construction.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;

use crate::buffers::promise::PromiseBuffer;
use crate::core::ChannelCore;
use crate::handles::generic;
use crate::ops;
use crate::result::{RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError};

/// Creates a one-shot channel. `consume_once = true` is the usual promise
/// semantics (one value, one successful `recv`); `consume_once = false`
/// keeps handing out a clone of the stored value to every `recv` until the
/// sender closes.
pub fn channel<T: Send + Clone + 'static>(consume_once: bool) -> (Sender<T>, Receiver<T>) {
    let core = ChannelCore::new(PromiseBuffer::new(consume_once), 1, 1, None);
    (Sender::new(core.clone()), Receiver::new(core))
}

/// The sending half of a one-shot channel.
pub struct Sender<T: Send + Clone + 'static> {
    inner: generic::Sender<T, PromiseBuffer<T>>,
}

impl<T: Send + Clone + 'static> Sender<T> {
    fn new(core: Arc<ChannelCore<T, PromiseBuffer<T>>>) -> Self {
        Self {
            inner: generic::Sender::new(core),
        }
    }

    /// Sets the value. Fails with `Full` if the promise was already set
    /// (whether or not it has been consumed yet).
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.inner.try_send(value)
    }

    /// Sets the value. Since a promise buffer's `try_push` only ever fails
    /// with `Full` (never blocks waiting for space), this never actually
    /// suspends — provided for API symmetry with the other flavors.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send(value).await
    }

    /// Sets the value, failing with `Timeout` if `delay` elapses first (in
    /// practice only reachable if the promise was already set when called).
    pub async fn send_timeout<D: Future<Output = ()>>(
        &self,
        value: T,
        delay: D,
    ) -> Result<(), SendTimeoutError<T>> {
        self.inner.send_timeout(value, delay).await
    }

    /// Returns `true` once the channel is disconnected from this sender's
    /// point of view.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Closes the channel explicitly, as if this handle were dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: Send + Clone + 'static> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// The receiving half of a one-shot channel.
pub struct Receiver<T: Send + Clone + 'static> {
    inner: generic::Receiver<T, PromiseBuffer<T>>,
}

impl<T: Send + Clone + 'static> Receiver<T> {
    fn new(core: Arc<ChannelCore<T, PromiseBuffer<T>>>) -> Self {
        Self {
            inner: generic::Receiver::new(core),
        }
    }

    /// Receives the value without blocking, failing with `Empty` if the
    /// promise has not been set yet.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.inner.try_recv()
    }

    /// Waits for the value to be set.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        self.inner.recv().await
    }

    /// Returns a cancelable receive future; see [`ops::RecvCancelable`].
    pub fn recv_cancelable(&mut self) -> ops::RecvCancelable<T> {
        self.inner.recv_cancelable()
    }

    /// Waits for the value, failing with `Timeout` if `delay` elapses first.
    pub async fn recv_timeout<D: Future<Output = ()>>(
        &mut self,
        delay: D,
    ) -> Result<T, RecvTimeoutError> {
        self.inner.recv_timeout(delay).await
    }

    /// Returns `true` once this receiver observes the channel as
    /// disconnected.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Closes the channel explicitly, as if this handle were dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: Send + Clone + 'static> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T: Send + Clone + 'static> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;

    #[test]
    fn consume_once_disconnects_after_first_read() {
        let (tx, mut rx) = channel::<i32>(true);
        tx.try_send(42).unwrap();
        block_on(async {
            assert_eq!(rx.recv().await, Ok(42));
            assert_eq!(rx.recv().await, Err(RecvError));
        });
    }

    #[test]
    fn repeated_reads_keep_returning_the_stored_value() {
        // `consume_once = false`: the stored value is never cleared by a
        // read, so it is the *receiver* closing (not the sender) that ends
        // the stream of repeat-reads — see `recv_disconnected`'s
        // `closedReceivers ∨ (closedSenders ∧ buf.empty)` formula, and this
        // buffer's `len_hint` never reports empty while a value is set.
        let (tx, mut rx) = channel::<i32>(false);
        tx.try_send(7).unwrap();
        assert_eq!(rx.try_recv(), Ok(7));
        tx.close();
        assert_eq!(rx.try_recv(), Ok(7));
        assert_eq!(rx.try_recv(), Ok(7));
    }
}
