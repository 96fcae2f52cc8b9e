//! Promise buffer: one-shot, single value, `consumeOnce` semantics. Backs
//! the one-shot channel flavor. A second `try_push` after the slot is set
//! fails, whether or not the value has been consumed yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::buffer::{ChannelBuffer, PushOutcome};
use crate::waiter::{PopWaiter, SingleWaiterSlot, WaiterOutcome};

pub(crate) struct PromiseBuffer<T: Clone> {
    set: AtomicBool,
    /// When `false`, `try_pop` repeatedly returns a clone of the stored
    /// value instead of taking it: the `consumeOnce=false` mode, in which
    /// every `recv` observes the stored value until the sender closes and
    /// the usual drain semantics apply.
    consume_once: bool,
    slot: Mutex<Option<T>>,
    pop_slot: Arc<SingleWaiterSlot<T>>,
}

impl<T: Clone> PromiseBuffer<T> {
    pub(crate) fn new(consume_once: bool) -> Self {
        Self {
            set: AtomicBool::new(false),
            consume_once,
            slot: Mutex::new(None),
            pop_slot: Arc::new(SingleWaiterSlot::new()),
        }
    }
}

impl<T: Send + Clone> ChannelBuffer<T> for PromiseBuffer<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        if self
            .set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return PushOutcome::Full(value);
        }
        // Store first so a pop-waiter registered *after* this push (and
        // hence not reachable via the bypass below) still finds the value
        // via its synchronous `try_pop` retry.
        *self.slot.lock().unwrap() = Some(value.clone());
        if self.pop_slot.try_bypass(value).is_ok() && self.consume_once {
            // The parked waiter already consumed the one-and-only value;
            // clear storage so a later `try_pop` doesn't hand it out again.
            self.slot.lock().unwrap().take();
        }
        PushOutcome::Ok
    }

    fn try_pop(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap();
        if self.consume_once {
            slot.take()
        } else {
            slot.clone()
        }
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        if let Some(v) = self.try_pop() {
            return PopWaiter::Ready(WaiterOutcome::Value(v));
        }
        PopWaiter::Single(self.pop_slot.ticket())
    }

    fn wake_all_push_waiters(&self) {
        // A promise can only ever be set once; there is nothing resembling
        // a blocked pusher to wake.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_push_fails_after_the_promise_is_set() {
        let buf = PromiseBuffer::new(true);
        assert!(matches!(buf.try_push(1), PushOutcome::Ok));
        assert!(matches!(buf.try_push(2), PushOutcome::Full(2)));
        assert_eq!(buf.try_pop(), Some(1));
        assert_eq!(buf.try_pop(), None);
    }

    #[test]
    fn second_push_fails_even_before_first_is_consumed() {
        let buf = PromiseBuffer::new(true);
        assert!(matches!(buf.try_push("first"), PushOutcome::Ok));
        assert!(matches!(buf.try_push("second"), PushOutcome::Full("second")));
    }

    #[test]
    fn consume_once_false_allows_repeated_reads() {
        let buf = PromiseBuffer::new(false);
        assert!(matches!(buf.try_push("hi"), PushOutcome::Ok));
        assert_eq!(buf.try_pop(), Some("hi"));
        assert_eq!(buf.try_pop(), Some("hi"));
        assert_eq!(buf.try_pop(), Some("hi"));
    }
}
