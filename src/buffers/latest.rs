//! LatestOnly buffer: one logical slot, last-wins. A push always succeeds
//! and overwrites whatever was previously queued, matching the "UI/progress"
//! use case where only the most recent value matters.

use std::sync::Arc;
use std::sync::Mutex;

use async_event::Event;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::{PopWaiter, SingleWaiterSlot};

/// Single logical consumer, as with any coalescing slot — two concurrent
/// poppers would race over who gets the one value.
pub(crate) struct LatestOnlyBuffer<T> {
    slot: Mutex<Option<T>>,
    pop_slot: Arc<SingleWaiterSlot<T>>,
    /// Never notified, for the same reason as
    /// [`super::unbounded::UnboundedFifo::push_signal`].
    push_signal: Event,
}

impl<T> LatestOnlyBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            pop_slot: Arc::new(SingleWaiterSlot::new()),
            push_signal: Event::new(),
        }
    }
}

impl<T: Send> ChannelBuffer<T> for LatestOnlyBuffer<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        match self.pop_slot.try_bypass(value) {
            Ok(()) => PushOutcome::Ok,
            Err(value) => {
                *self.slot.lock().unwrap() = Some(value);
                PushOutcome::Ok
            }
        }
    }

    fn try_pop(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.try_pop() {
            return PopWaiter::Ready(crate::waiter::WaiterOutcome::Value(v));
        }
        PopWaiter::Single(self.pop_slot.ticket())
    }

    fn wake_all_push_waiters(&self) {
        // Pushes never block: the slot is always writable.
    }

    fn fail_all_pop_waiters(&self) {
        self.pop_slot.fail();
    }

    fn clear(&self) {
        self.slot.lock().unwrap().take();
    }

    fn len_hint(&self) -> usize {
        usize::from(self.slot.lock().unwrap().is_some())
    }
}

impl<T: Send> BoundedBuffer<T> for LatestOnlyBuffer<T> {
    fn sender_signal(&self) -> &Event {
        &self.push_signal
    }

    fn capacity(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_push_overwrites_earlier_value() {
        let buf = LatestOnlyBuffer::new();
        assert!(matches!(buf.try_push(1), PushOutcome::Ok));
        assert!(matches!(buf.try_push(2), PushOutcome::Ok));
        assert!(matches!(buf.try_push(3), PushOutcome::Ok));
        assert_eq!(buf.try_pop(), Some(3));
        assert_eq!(buf.try_pop(), None);
    }
}
