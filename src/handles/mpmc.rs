//! Multi-producer, multi-consumer channel.
//!
//! Both `Sender` and `Receiver` are `Clone`: any number of producers and
//! consumers may share the same channel. Storage is either unbounded
//! (optionally chunked) or a bounded [`MpmcFifo`], all genuinely
//! multi-consumer-safe (built on [`crossbeam_queue`] rather than the
//! single-consumer Vyukov ring the SPSC/bounded-MPSC flavors use).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;

use crate::buffer::DynBoundedBuffer;
use crate::buffers::chunked::ChunkedFifo;
use crate::buffers::mpmc::MpmcFifo;
use crate::buffers::unbounded::UnboundedFifo;
use crate::core::ChannelCore;
use crate::handles::generic;
use crate::ops;
use crate::policy::{DropPolicy, DropPolicyBuffer};
use crate::result::{RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError};

enum Shape {
    Unbounded,
    Chunked,
    Bounded(usize),
}

/// Builder for an MPMC channel's storage and policy.
pub struct Builder<T> {
    shape: Shape,
    policy: DropPolicy,
    on_drop: Option<Arc<dyn Fn(T) + Send + Sync>>,
    metrics_id: Option<Arc<str>>,
}

impl<T: Send + 'static> Default for Builder<T> {
    fn default() -> Self {
        Self {
            shape: Shape::Unbounded,
            policy: DropPolicy::Block,
            on_drop: None,
            metrics_id: None,
        }
    }
}

impl<T: Send + 'static> Builder<T> {
    /// Starts from the default shape: unbounded, plain (non-chunked).
    pub fn new() -> Self {
        Self::default()
    }

    /// Unbounded, burst-tolerant storage (hot ring plus overflow chunks).
    pub fn chunked(mut self) -> Self {
        self.shape = Shape::Chunked;
        self
    }

    /// Fixed-capacity FIFO with backpressure (or drop policy, see
    /// [`Self::drop_policy`]).
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.shape = Shape::Bounded(capacity);
        self
    }

    /// Sets the drop policy applied when [`Self::bounded`] storage is full.
    /// Has no effect for the unbounded shapes.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers an observer invoked for every value the drop policy
    /// discards.
    pub fn on_drop(mut self, on_drop: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.on_drop = Some(Arc::new(on_drop));
        self
    }

    /// Tags this channel for a `MetricsRecorder` implementation.
    pub fn metrics_id(mut self, metrics_id: impl Into<Arc<str>>) -> Self {
        self.metrics_id = Some(metrics_id.into());
        self
    }

    /// Builds the channel with one initial sender and one initial receiver.
    pub fn build(self) -> (Sender<T>, Receiver<T>) {
        let buf: DynBoundedBuffer<T> = match self.shape {
            Shape::Unbounded => Box::new(UnboundedFifo::new()),
            Shape::Chunked => Box::new(ChunkedFifo::new()),
            Shape::Bounded(capacity) => {
                let inner = MpmcFifo::new(capacity);
                if matches!(self.policy, DropPolicy::Block) {
                    Box::new(inner)
                } else {
                    Box::new(DropPolicyBuffer::new(inner, self.policy, self.on_drop))
                }
            }
        };
        let core = ChannelCore::new(buf, 1, 1, self.metrics_id);
        (Sender::new(core.clone()), Receiver::new(core))
    }
}

/// Creates the default shape: unbounded, FIFO, no drop policy.
pub fn unbounded<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
    Builder::new().build()
}

/// Creates a bounded MPMC channel that blocks senders once full.
pub fn channel<T: Send + 'static>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    Builder::new().bounded(capacity).build()
}

/// The sending half of an MPMC channel. `Clone` registers one more
/// participating producer.
pub struct Sender<T: Send + 'static> {
    inner: generic::Sender<T, DynBoundedBuffer<T>>,
}

impl<T: Send + 'static> Sender<T> {
    fn new(core: Arc<ChannelCore<T, DynBoundedBuffer<T>>>) -> Self {
        Self {
            inner: generic::Sender::new(core),
        }
    }

    /// Sends a value without blocking, failing if the channel reports
    /// `Full`.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.inner.try_send(value)
    }

    /// Sends a value, waiting if the channel currently reports `Full`.
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

    /// Closes the channel explicitly, as if every sender handle were
    /// dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: Send + 'static> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_handle(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// The receiving half of an MPMC channel. `Clone` registers one more
/// participating consumer; each clone drains from the same shared storage
/// (no fan-out — every value still goes to exactly one receiver).
pub struct Receiver<T: Send + 'static> {
    inner: generic::Receiver<T, DynBoundedBuffer<T>>,
}

impl<T: Send + 'static> Receiver<T> {
    fn new(core: Arc<ChannelCore<T, DynBoundedBuffer<T>>>) -> Self {
        Self {
            inner: generic::Receiver::new(core),
        }
    }

    /// Receives a value without blocking, failing with `Empty` if none is
    /// ready.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.inner.try_recv()
    }

    /// Receives the next value, waiting if the channel is currently empty.
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

    /// Closes the channel explicitly, as if every receiver handle were
    /// dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: Send + 'static> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_handle(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;

    #[test]
    fn multiple_consumers_share_the_queue() {
        let (tx, rx) = channel::<i32>(8);
        let mut rx2 = rx.clone();
        let mut rx = rx;
        for i in 0..4 {
            tx.try_send(i).unwrap();
        }
        drop(tx);
        let mut seen = Vec::new();
        block_on(async {
            while let Ok(v) = rx.recv().await {
                seen.push(v);
            }
            while let Ok(v) = rx2.recv().await {
                seen.push(v);
            }
        });
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
