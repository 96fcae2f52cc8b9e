//! Single-producer, single-consumer bounded channel.
//!
//! The tightest-contract flavor: exactly one [`Sender`] and one [`Receiver`]
//! ever exist for a given channel, so neither type implements `Clone`. Built
//! on [`SrswRing`], the same lock-free Vyukov-derived ring used by the
//! bounded MPSC flavor, since single-reader single-writer usage is just the
//! cardinality-restricted special case.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;

use crate::buffers::srsw::SrswRing;
use crate::core::ChannelCore;
use crate::handles::generic;
use crate::ops;
use crate::result::{RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError};

/// Creates a bounded SPSC channel. `capacity` is rounded up to the next
/// power of two by the underlying ring.
pub fn channel<T: Send + 'static>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let core = ChannelCore::new(SrswRing::new(capacity), 1, 1, None);
    (Sender::new(core.clone()), Receiver::new(core))
}

/// The sending half of an SPSC channel.
pub struct Sender<T: Send + 'static> {
    inner: generic::Sender<T, SrswRing<T>>,
}

impl<T: Send + 'static> Sender<T> {
    fn new(core: Arc<ChannelCore<T, SrswRing<T>>>) -> Self {
        Self {
            inner: generic::Sender::new(core),
        }
    }

    /// Sends a value without blocking, failing if the ring is full.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.inner.try_send(value)
    }

    /// Sends a value, waiting for space if the ring is full.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send(value).await
    }

    /// Sends a value, failing with `Timeout` if `delay` elapses first.
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

impl<T: Send + 'static> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// The receiving half of an SPSC channel.
pub struct Receiver<T: Send + 'static> {
    inner: generic::Receiver<T, SrswRing<T>>,
}

impl<T: Send + 'static> Receiver<T> {
    fn new(core: Arc<ChannelCore<T, SrswRing<T>>>) -> Self {
        Self {
            inner: generic::Receiver::new(core),
        }
    }

    /// Receives a value without blocking, failing with `Empty` if none is
    /// ready.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.inner.try_recv()
    }

    /// Receives the next value, waiting if the ring is currently empty.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        self.inner.recv().await
    }

    /// Returns a cancelable receive future; see [`ops::RecvCancelable`].
    pub fn recv_cancelable(&mut self) -> ops::RecvCancelable<T> {
        self.inner.recv_cancelable()
    }

    /// Receives the next value, failing with `Timeout` if `delay` elapses
    /// first.
    pub async fn recv_timeout<D: Future<Output = ()>>(
        &mut self,
        delay: D,
    ) -> Result<T, RecvTimeoutError> {
        self.inner.recv_timeout(delay).await
    }

    /// Drains up to `max` values without blocking, in FIFO order.
    pub fn try_recv_many(&mut self, max: usize) -> Vec<T> {
        self.inner.try_recv_many(max)
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

impl<T: Send + 'static> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}
