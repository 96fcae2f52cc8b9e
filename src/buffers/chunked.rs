//! Chunked unbounded FIFO: a "hot" power-of-two ring as the fast lane, with
//! overflow absorbed by a tail of power-of-two mini-ring "chunks". Burst
//! traffic spills into a fresh chunk instead of forcing every push through a
//! single contended structure; a rebalancing rule drains chunks back into
//! the hot ring once it has room, without thrashing on small backlogs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_event::Event;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::{MultiWaiterQueue, PopWaiter, WaiterOutcome};
use std::sync::Arc;

/// Hot-ring capacity. Chosen small enough that most traffic never touches a
/// chunk at all, matching the "fast lane" framing.
const HOT_CAPACITY: usize = 64;
/// Size of each overflow chunk.
const CHUNK_SIZE: usize = 256;
/// Hot ring must fall below `HOT_CAPACITY / THRESHOLD_DIV` before a
/// rebalance is considered.
const THRESHOLD_DIV: usize = 4;
/// At most this many items move from the head chunk into the hot ring per
/// rebalance.
const REBALANCE_BATCH: usize = 16;
/// The head chunk must retain at least `CHUNK_SIZE / GATE_DIV` items after a
/// rebalance, or rebalancing is skipped entirely this round — this is what
/// prevents a near-empty chunk from being shuffled back and forth on every
/// single pop.
const GATE_DIV: usize = 4;

struct Chunks<T> {
    hot: VecDeque<T>,
    chunks: VecDeque<VecDeque<T>>,
}

impl<T> Chunks<T> {
    fn new() -> Self {
        Self {
            hot: VecDeque::with_capacity(HOT_CAPACITY),
            chunks: VecDeque::new(),
        }
    }

    fn push(&mut self, value: T) {
        if self.hot.len() < HOT_CAPACITY && self.chunks.is_empty() {
            self.hot.push_back(value);
            return;
        }
        match self.chunks.back_mut() {
            Some(tail) if tail.len() < CHUNK_SIZE => tail.push_back(value),
            _ => {
                let mut chunk = VecDeque::with_capacity(CHUNK_SIZE);
                chunk.push_back(value);
                self.chunks.push_back(chunk);
            }
        }
    }

    fn pop(&mut self) -> Option<T> {
        let value = self.hot.pop_front().or_else(|| {
            let value = self.chunks.front_mut()?.pop_front();
            if self.chunks.front().is_some_and(VecDeque::is_empty) {
                self.chunks.pop_front();
            }
            value
        });
        if value.is_some() {
            self.rebalance();
        }
        value
    }

    fn rebalance(&mut self) {
        if self.hot.len() >= HOT_CAPACITY / THRESHOLD_DIV {
            return;
        }
        let Some(head) = self.chunks.front_mut() else {
            return;
        };
        if head.len() < CHUNK_SIZE / GATE_DIV {
            return;
        }
        let moved = REBALANCE_BATCH.min(HOT_CAPACITY - self.hot.len());
        for _ in 0..moved {
            let Some(v) = head.pop_front() else { break };
            self.hot.push_back(v);
        }
        if head.is_empty() {
            self.chunks.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.hot.len() + self.chunks.iter().map(VecDeque::len).sum::<usize>()
    }

    fn clear(&mut self) {
        self.hot.clear();
        self.chunks.clear();
    }
}

/// Supports genuine MPMC: both storage and the pop-waiter list are
/// mutex-guarded, matching the flavor table's "burst-tolerant MPSC/MPMC"
/// entry.
pub(crate) struct ChunkedFifo<T> {
    storage: Mutex<Chunks<T>>,
    pop_waiters: Arc<MultiWaiterQueue<T>>,
    /// Never notified, for the same reason as
    /// [`super::unbounded::UnboundedFifo::push_signal`].
    push_signal: Event,
}

impl<T> ChunkedFifo<T> {
    pub(crate) fn new() -> Self {
        Self {
            storage: Mutex::new(Chunks::new()),
            pop_waiters: Arc::new(MultiWaiterQueue::new()),
            push_signal: Event::new(),
        }
    }
}

impl<T: Send> ChannelBuffer<T> for ChunkedFifo<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        let mut outcome = WaiterOutcome::Value(value);
        while let Some(waiter) = self.pop_waiters.pop_one() {
            match waiter.complete(outcome) {
                Ok(()) => return PushOutcome::Ok,
                Err(back) => outcome = back,
            }
        }
        let WaiterOutcome::Value(value) = outcome else {
            unreachable!("try_push never constructs a Disconnected outcome")
        };
        self.storage.lock().unwrap().push(value);
        PushOutcome::Ok
    }

    fn try_pop(&self) -> Option<T> {
        self.storage.lock().unwrap().pop()
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.try_pop() {
            return PopWaiter::Ready(WaiterOutcome::Value(v));
        }
        let cell = self.pop_waiters.add();
        if let Some(v) = self.try_pop() {
            self.pop_waiters.remove(&cell);
            return PopWaiter::Ready(WaiterOutcome::Value(v));
        }
        PopWaiter::Multi(cell, self.pop_waiters.clone())
    }

    fn wake_all_push_waiters(&self) {
        // Unbounded: pushes never block.
    }

    fn fail_all_pop_waiters(&self) {
        self.pop_waiters.fail_all();
    }

    fn clear(&self) {
        self.storage.lock().unwrap().clear();
    }

    fn len_hint(&self) -> usize {
        self.storage.lock().unwrap().len()
    }
}

impl<T: Send> BoundedBuffer<T> for ChunkedFifo<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_across_hot_ring_and_chunks() {
        let buf = ChunkedFifo::new();
        let n = HOT_CAPACITY + CHUNK_SIZE * 2 + 7;
        for i in 0..n {
            buf.try_push(i);
        }
        for i in 0..n {
            assert_eq!(buf.try_pop(), Some(i));
        }
        assert_eq!(buf.try_pop(), None);
    }

    #[test]
    fn rebalance_refills_hot_ring_from_head_chunk() {
        let buf = ChunkedFifo::new();
        let n = HOT_CAPACITY + CHUNK_SIZE;
        for i in 0..n {
            buf.try_push(i);
        }
        // Drain the hot ring; rebalancing should start pulling from the
        // chunk once it crosses the threshold.
        for i in 0..HOT_CAPACITY {
            assert_eq!(buf.try_pop(), Some(i));
        }
        assert_eq!(buf.try_pop(), Some(HOT_CAPACITY));
        assert_eq!(buf.len_hint(), n - HOT_CAPACITY - 1);
    }

    #[test]
    fn small_backlog_does_not_thrash() {
        let buf = ChunkedFifo::new();
        for i in 0..HOT_CAPACITY {
            buf.try_push(i);
        }
        // One lone extra item spills into a chunk of its own.
        buf.try_push(HOT_CAPACITY);
        assert_eq!(buf.try_pop(), Some(0));
        // The head chunk holds a single item, under the gate threshold, so
        // it must stay put rather than being moved into the hot ring.
        assert_eq!(buf.len_hint(), HOT_CAPACITY);
    }
}
