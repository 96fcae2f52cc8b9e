//! Bounded FIFO buffer, single logical consumer.
//!
//! Built on a lock-free Vyukov-derived queue ([`super::vyukov::VyukovQueue`]),
//! generalized from a standalone channel into one `ChannelBuffer` flavor
//! among several. It backs the bounded
//! variants of the SPSC and MPSC handles, where exactly one receiver ever
//! calls `try_pop`/registers a pop-waiter. Genuinely multi-consumer bounded
//! channels (MPMC) use [`super::mpmc::MpmcFifo`] instead, since the Vyukov
//! queue's `pop` is only sound from a single thread.

use std::sync::Arc;

use async_event::Event;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::buffers::vyukov::{VyukovPopError, VyukovPushError, VyukovQueue};
use crate::waiter::{PopWaiter, SingleWaiterSlot};

pub(crate) struct BoundedFifo<T> {
    queue: VyukovQueue<T>,
    pop_slot: Arc<SingleWaiterSlot<T>>,
    push_signal: Event,
}

impl<T> BoundedFifo<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VyukovQueue::new(capacity),
            pop_slot: Arc::new(SingleWaiterSlot::new()),
            push_signal: Event::new(),
        }
    }

    /// Pops a value. Only sound when called by a single logical consumer,
    /// upheld by every handle type that composes this buffer. A successful
    /// pop frees a ring slot, so it wakes a sender blocked on
    /// [`Self::sender_signal`].
    fn pop_unchecked(&self) -> Option<T> {
        match unsafe { self.queue.pop() } {
            Ok(v) => {
                self.push_signal.notify(1);
                Some(v)
            }
            Err(VyukovPopError::Empty) | Err(VyukovPopError::Closed) => None,
        }
    }
}

impl<T: Send> ChannelBuffer<T> for BoundedFifo<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        // Bypass: hand the value directly to a parked popper without
        // touching the ring, per the data-model contract.
        match self.pop_slot.try_bypass(value) {
            Ok(()) => PushOutcome::Ok,
            Err(value) => match self.queue.push(value) {
                Ok(()) => PushOutcome::Ok,
                Err(VyukovPushError::Full(v)) => PushOutcome::Full(v),
                // Closing is handled at the lifecycle layer, not here; a
                // closed underlying queue cannot happen before the core
                // clears it, but degrade gracefully rather than panic.
                Err(VyukovPushError::Closed(v)) => PushOutcome::Full(v),
            },
        }
    }

    fn try_pop(&self) -> Option<T> {
        self.pop_unchecked()
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.pop_unchecked() {
            return PopWaiter::Ready(crate::waiter::WaiterOutcome::Value(v));
        }
        PopWaiter::Single(self.pop_slot.ticket())
    }

    fn wake_all_push_waiters(&self) {
        self.push_signal.notify(usize::MAX);
    }

    fn fail_all_pop_waiters(&self) {
        self.pop_slot.fail();
    }

    fn clear(&self) {
        while self.pop_unchecked().is_some() {}
    }

    fn len_hint(&self) -> usize {
        self.queue.len()
    }
}

impl<T: Send> BoundedBuffer<T> for BoundedFifo<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo_order() {
        let buf = BoundedFifo::new(2);
        assert!(matches!(buf.try_push(1), PushOutcome::Ok));
        assert!(matches!(buf.try_push(2), PushOutcome::Ok));
        assert!(matches!(buf.try_push(3), PushOutcome::Full(3)));
        assert_eq!(buf.try_pop(), Some(1));
        assert_eq!(buf.try_pop(), Some(2));
        assert_eq!(buf.try_pop(), None);
    }

    #[test]
    fn clear_drains_everything() {
        let buf = BoundedFifo::new(4);
        buf.try_push(1);
        buf.try_push(2);
        buf.clear();
        assert_eq!(buf.try_pop(), None);
    }
}
