//! Bounded multi-consumer FIFO: the MPMC backpressure flavor. Unlike
//! [`super::bounded::BoundedFifo`], more than one receiver may legitimately
//! be parked at once, so storage and the pop-waiter list both need to
//! tolerate concurrent consumers rather than a single fast slot.

use crossbeam_queue::ArrayQueue;

use async_event::Event;
use std::sync::Arc;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::{MultiWaiterQueue, PopWaiter, WaiterOutcome};

pub(crate) struct MpmcFifo<T> {
    storage: ArrayQueue<T>,
    pop_waiters: Arc<MultiWaiterQueue<T>>,
    push_signal: Event,
}

impl<T> MpmcFifo<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            storage: ArrayQueue::new(capacity.max(1)),
            pop_waiters: Arc::new(MultiWaiterQueue::new()),
            push_signal: Event::new(),
        }
    }
}

impl<T: Send> ChannelBuffer<T> for MpmcFifo<T> {
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
        match self.storage.push(value) {
            Ok(()) => PushOutcome::Ok,
            Err(value) => PushOutcome::Full(value),
        }
    }

    /// A successful pop frees a slot, so it wakes a sender blocked on
    /// [`Self::push_signal`].
    fn try_pop(&self) -> Option<T> {
        let value = self.storage.pop();
        if value.is_some() {
            self.push_signal.notify(1);
        }
        value
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
        self.push_signal.notify(usize::MAX);
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

impl<T: Send> BoundedBuffer<T> for MpmcFifo<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        self.storage.capacity()
    }
}
