//! Rendezvous buffer: zero capacity, strict handoff. A push only succeeds if
//! a popper is already parked waiting for it.

use std::sync::Arc;

use async_event::Event;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::{PopWaiter, SingleWaiterSlot, WaiterOutcome};

/// Single logical consumer only (SPSC/MPSC rendezvous handles); genuinely
/// multi-consumer rendezvous channels are out of scope (the flavor table
/// lists rendezvous under "strict sync", not MPMC).
pub(crate) struct RendezvousBuffer<T> {
    pop_slot: Arc<SingleWaiterSlot<T>>,
    push_signal: Event,
}

impl<T> RendezvousBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            pop_slot: Arc::new(SingleWaiterSlot::new()),
            push_signal: Event::new(),
        }
    }
}

impl<T: Send> ChannelBuffer<T> for RendezvousBuffer<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        match self.pop_slot.try_bypass(value) {
            Ok(()) => PushOutcome::Ok,
            Err(value) => PushOutcome::Full(value),
        }
    }

    fn try_pop(&self) -> Option<T> {
        // There is no storage to pop from outside a handoff in progress;
        // a popper must register and wait for a pusher to meet it.
        None
    }

    /// Registering a waiter is the event blocked senders are waiting for —
    /// there is no freed "space" in a zero-capacity buffer, only the
    /// appearance of a popper to hand a value to.
    fn add_pop_waiter(&self) -> PopWaiter<T> {
        let ticket = self.pop_slot.ticket();
        self.push_signal.notify(1);
        PopWaiter::Single(ticket)
    }

    fn wake_all_push_waiters(&self) {
        self.push_signal.notify(usize::MAX);
    }

    fn fail_all_pop_waiters(&self) {
        self.pop_slot.fail();
    }

    fn clear(&self) {}

    fn len_hint(&self) -> usize {
        0
    }
}

impl<T: Send> BoundedBuffer<T> for RendezvousBuffer<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        0
    }
}
