//! Single-producer, multi-consumer broadcast channel.
//!
//! Every subscriber observes every value published after it subscribed (plus
//! up to `replay` already-published values, clamped to the ring's retention
//! window); a lagging subscriber's cursor jumps forward to the oldest
//! still-live sequence rather than erroring. Built directly on
//! [`BroadcastRing`] rather than [`crate::core::ChannelCore`]: a broadcast
//! receive is parameterized by a per-subscriber cursor, which the uniform
//! `ChannelBuffer` contract (one shared pop, no per-caller state) has no room
//! for.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::buffers::broadcast::{BroadcastPop, BroadcastRing};
use crate::lifecycle::Lifecycle;
use crate::registry;
use crate::result::{RecvError, RecvTimeoutError, SendError, TryRecvError};
use crate::waiter::{PopWaiter, WaiterOutcome};

struct Core<T: Clone> {
    id: usize,
    ring: BroadcastRing<T>,
    lifecycle: Lifecycle,
    #[allow(dead_code)]
    metrics_id: Option<Arc<str>>,
}

impl<T: Send + Sync + Clone + 'static> Core<T> {
    fn new(capacity: usize, metrics_id: Option<Arc<str>>) -> Arc<Self> {
        let id = registry::reserve();
        let core = Arc::new(Self {
            id,
            ring: BroadcastRing::new(capacity),
            lifecycle: Lifecycle::new(1, 1),
            metrics_id,
        });
        registry::fill(id, core.clone());
        core
    }

    fn close_sender_side(&self) {
        self.lifecycle.mark_closed_senders();
        // The ring has no separate push-waiter list (publishing never
        // blocks); closing only needs to fail parked pop-waiters once the
        // ring itself is marked closed below, via `Self::maybe_close_ring`.
        self.maybe_close_ring();
    }

    fn close_receiver_side(&self) {
        self.lifecycle.mark_closed_receivers();
        self.maybe_close_ring();
    }

    /// The ring itself (as opposed to one subscriber's participation) is
    /// only ever closed once *both* directions are fully disconnected: a
    /// lone lingering subscriber must still be able to drain already-
    /// published values after the sender closes, and a freshly subscribed
    /// receiver must still be reachable while any sender remains.
    fn maybe_close_ring(&self) {
        if self.lifecycle.is_closed_senders() && self.lifecycle.active_receivers() == 0 {
            self.ring.close();
        }
        if self.lifecycle.is_closed_receivers() {
            self.ring.close();
        }
    }
}

impl<T: Clone> Drop for Core<T> {
    fn drop(&mut self) {
        registry::unregister(self.id);
    }
}

/// Creates a broadcast channel with the given power-of-two retention
/// capacity.
pub fn channel<T: Send + Sync + Clone + 'static>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let core = Core::new(capacity, None);
    let cursor = core.ring.cursor_at_head();
    (Sender::new(core.clone()), Receiver::new(core, cursor))
}

/// The sending half of a broadcast channel. Not `Clone`: broadcast is
/// single-producer by flavor definition.
pub struct Sender<T: Send + Sync + Clone + 'static> {
    core: Arc<Core<T>>,
}

impl<T: Send + Sync + Clone + 'static> Sender<T> {
    fn new(core: Arc<Core<T>>) -> Self {
        Self { core }
    }

    /// Publishes a value to every current and future subscriber. Never
    /// blocks: a full ring simply overwrites its oldest still-retained
    /// value, which the next `recv` from a lagging subscriber observes as a
    /// cursor jump rather than an error.
    pub fn try_send(&self, value: T) -> Result<(), crate::result::TrySendError<T>> {
        if self.core.lifecycle.send_disconnected() {
            return Err(crate::result::TrySendError::Disconnected(value));
        }
        self.core.ring.push(value);
        Ok(())
    }

    /// Publishes a value. Provided for API symmetry with the other flavors;
    /// since publishing never blocks, this never actually suspends.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.try_send(value)
            .map_err(|e| SendError::Disconnected(e.into_inner()))
    }

    /// Returns `true` once every subscriber has gone away.
    pub fn is_closed(&self) -> bool {
        self.core.lifecycle.send_disconnected()
    }

    /// Closes the channel explicitly, as if this handle were dropped.
    pub fn close(&self) {
        self.core.close_sender_side();
    }
}

impl<T: Send + Sync + Clone + 'static> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.core.lifecycle.release_sender() {
            self.core.close_sender_side();
        }
    }
}

impl<T: Send + Sync + Clone + 'static> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// A subscriber handle: owns an independent read cursor into the shared
/// ring. `subscribe` (and `Clone`) create additional, independent
/// subscribers sharing the same ring.
pub struct Receiver<T: Send + Sync + Clone + 'static> {
    core: Arc<Core<T>>,
    cursor: u64,
    /// The in-flight registration backing `Stream::poll_next`, kept across
    /// calls instead of rebuilt per poll: a freshly constructed
    /// `RecvCancelable` registers a waiter with the ring and is then dropped
    /// at the end of the function, which cancels that registration before
    /// the caller's waker could ever actually fire.
    stream_waiter: Option<PopWaiter<()>>,
}

impl<T: Send + Sync + Clone + 'static> Receiver<T> {
    fn new(core: Arc<Core<T>>, cursor: u64) -> Self {
        Self {
            core,
            cursor,
            stream_waiter: None,
        }
    }

    /// Creates an additional, independent subscriber. `replay` requests up
    /// to that many already-published values be redelivered to the new
    /// subscriber, clamped to the ring's retention window.
    pub fn subscribe(&self, replay: u64) -> Self {
        self.core.lifecycle.clone_receiver();
        let cursor = self.core.ring.initial_cursor(replay);
        Self {
            core: self.core.clone(),
            cursor,
            stream_waiter: None,
        }
    }

    /// Receives the next value without blocking.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        match self.core.ring.try_receive(&mut self.cursor) {
            BroadcastPop::Value(v) => Ok(v),
            BroadcastPop::Empty => Err(TryRecvError::Empty),
            BroadcastPop::Disconnected => Err(TryRecvError::Disconnected),
        }
    }

    /// Waits for the next value, including ones published while this
    /// subscriber was behind (subject to lag recovery).
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        loop {
            let mut waiter = self.core.ring.add_waiter();
            match self.core.ring.try_receive(&mut self.cursor) {
                BroadcastPop::Value(v) => {
                    waiter.cancel();
                    return Ok(v);
                }
                BroadcastPop::Disconnected => {
                    waiter.cancel();
                    return Err(RecvError);
                }
                BroadcastPop::Empty => {
                    waiter.await;
                }
            }
        }
    }

    /// Returns a cancelable receive future.
    pub fn recv_cancelable(&mut self) -> RecvCancelable<'_, T> {
        RecvCancelable {
            receiver: self,
            waiter: None,
            canceled: false,
        }
    }

    /// Waits for the next value, failing with `Timeout` if `delay` elapses
    /// first.
    pub async fn recv_timeout<D: Future<Output = ()>>(
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

    /// Returns `true` once this subscriber observes the channel as
    /// disconnected.
    pub fn is_closed(&self) -> bool {
        self.core.lifecycle.is_closed_receivers()
    }

    /// Unsubscribes explicitly, as if this handle were dropped.
    pub fn close(&self) {
        self.core.close_receiver_side();
    }
}

impl<T: Send + Sync + Clone + 'static> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.core.lifecycle.clone_receiver();
        Self {
            core: self.core.clone(),
            cursor: self.cursor,
            stream_waiter: None,
        }
    }
}

impl<T: Send + Sync + Clone + 'static> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.core.lifecycle.release_receiver() {
            self.core.close_receiver_side();
        }
    }
}

impl<T: Send + Sync + Clone + 'static> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T: Send + Sync + Clone + 'static> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.stream_waiter.is_none() {
                this.stream_waiter = Some(this.core.ring.add_waiter());
            }
            match this.core.ring.try_receive(&mut this.cursor) {
                BroadcastPop::Value(v) => {
                    if let Some(mut waiter) = this.stream_waiter.take() {
                        waiter.cancel();
                    }
                    return Poll::Ready(Some(v));
                }
                BroadcastPop::Disconnected => {
                    if let Some(mut waiter) = this.stream_waiter.take() {
                        waiter.cancel();
                    }
                    return Poll::Ready(None);
                }
                BroadcastPop::Empty => {
                    let waiter = this.stream_waiter.as_mut().unwrap();
                    match Pin::new(waiter).poll(cx) {
                        Poll::Ready(WaiterOutcome::Value(())) => {
                            this.stream_waiter = None;
                            continue;
                        }
                        Poll::Ready(WaiterOutcome::Disconnected) => {
                            this.stream_waiter = None;
                            continue;
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

/// A cancelable broadcast receive; see `ops::RecvCancelable` for the
/// matching contract used by every other flavor.
pub struct RecvCancelable<'a, T: Send + Sync + Clone + 'static> {
    receiver: &'a mut Receiver<T>,
    waiter: Option<PopWaiter<()>>,
    canceled: bool,
}

impl<'a, T: Send + Sync + Clone + 'static> RecvCancelable<'a, T> {
    /// Cancels the pending receive. See `ops::RecvCancelable::cancel` for
    /// the idempotency contract.
    pub fn cancel(&mut self) -> bool {
        if self.canceled {
            return true;
        }
        match &mut self.waiter {
            None => false,
            Some(waiter) => {
                if waiter.cancel() {
                    self.canceled = true;
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl<'a, T: Send + Sync + Clone + 'static> Future for RecvCancelable<'a, T> {
    type Output = Result<T, RecvTimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.canceled {
            return Poll::Ready(Err(RecvTimeoutError::Canceled));
        }
        loop {
            if this.waiter.is_none() {
                this.waiter = Some(this.receiver.core.ring.add_waiter());
            }
            match this.receiver.core.ring.try_receive(&mut this.receiver.cursor) {
                BroadcastPop::Value(v) => {
                    if let Some(mut waiter) = this.waiter.take() {
                        waiter.cancel();
                    }
                    return Poll::Ready(Ok(v));
                }
                BroadcastPop::Disconnected => {
                    if let Some(mut waiter) = this.waiter.take() {
                        waiter.cancel();
                    }
                    return Poll::Ready(Err(RecvTimeoutError::Disconnected));
                }
                BroadcastPop::Empty => {
                    let waiter = this.waiter.as_mut().unwrap();
                    match Pin::new(waiter).poll(cx) {
                        Poll::Ready(WaiterOutcome::Value(())) => {
                            this.waiter = None;
                            continue;
                        }
                        Poll::Ready(WaiterOutcome::Disconnected) => {
                            this.waiter = None;
                            continue;
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;

    #[test]
    fn each_subscriber_gets_every_published_value() {
        let (tx, mut rx1) = channel::<i32>(4);
        let mut rx2 = rx1.subscribe(0);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert_eq!(rx1.try_recv(), Ok(1));
        assert_eq!(rx1.try_recv(), Ok(2));
        assert_eq!(rx2.try_recv(), Ok(1));
        assert_eq!(rx2.try_recv(), Ok(2));
    }

    #[test]
    fn lagging_subscriber_jumps_forward_on_recv() {
        let (tx, mut rx) = channel::<i32>(4);
        for i in 0..6 {
            tx.try_send(i).unwrap();
        }
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Ok(3));
    }

    #[test]
    fn drop_sender_disconnects_once_drained() {
        let (tx, mut rx) = channel::<i32>(2);
        tx.try_send(1).unwrap();
        drop(tx);
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn recv_waits_for_publish() {
        let (tx, mut rx) = channel::<i32>(4);
        block_on(async {
            tx.try_send(9).unwrap();
            assert_eq!(rx.recv().await, Ok(9));
        });
    }

    // `poll_next` must keep the same waiter registration alive across calls;
    // a version that rebuilds and drops a fresh one every time never
    // actually wakes the caller once a value is published.
    #[test]
    fn a_live_stream_poll_is_actually_woken_once_a_value_arrives() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::task::Wake;

        struct FlagWaker(AtomicBool);

        impl Wake for FlagWaker {
            fn wake(self: Arc<Self>) {
                self.0.store(true, Ordering::SeqCst);
            }

            fn wake_by_ref(self: &Arc<Self>) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let (tx, mut rx) = channel::<i32>(4);

        let flag = Arc::new(FlagWaker(AtomicBool::new(false)));
        let waker = std::task::Waker::from(flag.clone());
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut rx).poll_next(&mut cx).is_pending());
        assert!(!flag.0.load(Ordering::SeqCst));

        tx.try_send(3).unwrap();
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(Pin::new(&mut rx).poll_next(&mut cx), Poll::Ready(Some(3)));
    }
}
