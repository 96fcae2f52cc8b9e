//! Unbounded FIFO buffer: the default MPSC/MPMC flavor. Pushes never fail;
//! pops park a waiter when empty.

use std::sync::Arc;

use async_event::Event;
use crossbeam_queue::SegQueue;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::{MultiWaiterQueue, PopWaiter, WaiterOutcome};

/// Storage is [`crossbeam_queue::SegQueue`], the standard ecosystem answer
/// for an unbounded lock-free MPMC queue — exactly what "never fails,
/// default MPSC/MPMC" calls for, without reinventing a chunked allocator
/// (that design is reserved for [`super::chunked::ChunkedFifo`], which
/// additionally promises burst-tolerant rebalancing).
pub(crate) struct UnboundedFifo<T> {
    storage: SegQueue<T>,
    pop_waiters: Arc<MultiWaiterQueue<T>>,
    /// Never notified: `try_push` never returns `Full`, so nothing ever
    /// parks here. Exists only so this buffer satisfies [`BoundedBuffer`],
    /// letting `ops::send_bounded` drive every MPSC/MPMC flavor uniformly
    /// instead of branching the handle layer on "can this buffer block".
    push_signal: Event,
}

impl<T> UnboundedFifo<T> {
    pub(crate) fn new() -> Self {
        Self {
            storage: SegQueue::new(),
            pop_waiters: Arc::new(MultiWaiterQueue::new()),
            push_signal: Event::new(),
        }
    }
}

impl<T: Send> ChannelBuffer<T> for UnboundedFifo<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        let mut outcome = WaiterOutcome::Value(value);
        while let Some(waiter) = self.pop_waiters.pop_one() {
            match waiter.complete(outcome) {
                Ok(()) => return PushOutcome::Ok,
                // Lost a race with that waiter's own cancellation: try the
                // next one instead of dropping the value.
                Err(back) => outcome = back,
            }
        }
        let WaiterOutcome::Value(value) = outcome else {
            unreachable!("try_push never constructs a Disconnected outcome")
        };
        self.storage.push(value);
        PushOutcome::Ok
    }

    fn try_pop(&self) -> Option<T> {
        self.storage.pop()
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.storage.pop() {
            return PopWaiter::Ready(WaiterOutcome::Value(v));
        }
        let cell = self.pop_waiters.add();
        // Close the race: a push may have landed in storage between our
        // `pop()` above and registering the waiter.
        if let Some(v) = self.storage.pop() {
            self.pop_waiters.remove(&cell);
            return PopWaiter::Ready(WaiterOutcome::Value(v));
        }
        PopWaiter::Multi(cell, self.pop_waiters.clone())
    }

    fn wake_all_push_waiters(&self) {
        // Unbounded buffers never park a producer.
    }

    fn fail_all_pop_waiters(&self) {
        self.pop_waiters.fail_all();
    }

    fn clear(&self) {
        while self.storage.pop().is_some() {}
    }

    fn len_hint(&self) -> usize {
        self.storage.len()
    }
}

impl<T: Send> BoundedBuffer<T> for UnboundedFifo<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }
}
