//! Single-reader single-writer ring: the tightest-contract bounded flavor,
//! used by the SPSC handle pair. Built on the same lock-free Vyukov-derived
//! queue as [`super::bounded::BoundedFifo`] rather than a second hand-rolled
//! ring buffer — the SPSC handle pair already enforces exactly one sender
//! and one receiver at the type level, so the extra single-thread
//! specialization a bespoke Lamport ring would buy over the proven queue
//! isn't worth a second unsafe structure.

use std::sync::Arc;

use async_event::Event;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::buffers::vyukov::{VyukovPopError, VyukovPushError, VyukovQueue};
use crate::waiter::{PopWaiter, SingleWaiterSlot, WaiterOutcome};

pub(crate) struct SrswRing<T> {
    queue: VyukovQueue<T>,
    pop_slot: Arc<SingleWaiterSlot<T>>,
    push_signal: Event,
}

impl<T> SrswRing<T> {
    /// `capacity` is rounded up to the next power of two by
    /// [`VyukovQueue::new`].
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VyukovQueue::new(capacity),
            pop_slot: Arc::new(SingleWaiterSlot::new()),
            push_signal: Event::new(),
        }
    }

    /// A successful pop frees a ring slot, so it wakes a sender blocked on
    /// [`Self::push_signal`].
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

impl<T: Send> ChannelBuffer<T> for SrswRing<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        match self.pop_slot.try_bypass(value) {
            Ok(()) => PushOutcome::Ok,
            Err(value) => match self.queue.push(value) {
                Ok(()) => PushOutcome::Ok,
                Err(VyukovPushError::Full(v)) => PushOutcome::Full(v),
                Err(VyukovPushError::Closed(v)) => PushOutcome::Full(v),
            },
        }
    }

    fn try_pop(&self) -> Option<T> {
        self.pop_unchecked()
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.pop_unchecked() {
            return PopWaiter::Ready(WaiterOutcome::Value(v));
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

impl<T: Send> BoundedBuffer<T> for SrswRing<T> {
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
    fn push_pop_respects_power_of_two_capacity() {
        let buf = SrswRing::new(4);
        for i in 0..4 {
            assert!(matches!(buf.try_push(i), PushOutcome::Ok));
        }
        assert!(matches!(buf.try_push(4), PushOutcome::Full(4)));
        for i in 0..4 {
            assert_eq!(buf.try_pop(), Some(i));
        }
    }
}
