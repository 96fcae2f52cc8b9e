//! Drop-policy wrapper: turns any bounded buffer into a sliding window.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::buffer::{BoundedBuffer, ChannelBuffer, PushOutcome};
use crate::waiter::PopWaiter;

/// How a bounded buffer should react to a `try_push` landing on a full
/// buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropPolicy {
    /// Propagate `Full`; the caller must wait for space.
    Block,
    /// Drop the oldest queued value to make room, by logical queue
    /// position rather than physical storage order, then retry.
    Oldest,
    /// Drop the incoming value and report success.
    Newest,
}

/// Wraps any [`BoundedBuffer`] with a [`DropPolicy`] and an `on_drop`
/// observer.
///
/// `on_drop` is observational, not transactional: it may be invoked for a
/// value whose `send`/`try_send` already returned `Ok`. Panics from
/// `on_drop` are caught so a misbehaving observer cannot corrupt the
/// channel.
pub(crate) struct DropPolicyBuffer<T, B: BoundedBuffer<T>> {
    inner: B,
    policy: DropPolicy,
    on_drop: Option<Arc<dyn Fn(T) + Send + Sync>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T, B: BoundedBuffer<T>> DropPolicyBuffer<T, B> {
    pub(crate) fn new(
        inner: B,
        policy: DropPolicy,
        on_drop: Option<Arc<dyn Fn(T) + Send + Sync>>,
    ) -> Self {
        Self {
            inner,
            policy,
            on_drop,
            _marker: std::marker::PhantomData,
        }
    }

    fn notify_drop(&self, value: T) {
        if let Some(cb) = &self.on_drop {
            let cb = cb.clone();
            // `T` need not be `UnwindSafe`; the wrapper guarantees the
            // channel's own state is never touched by `on_drop`, so a
            // panic inside it cannot leave the buffer half-mutated.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| cb(value)));
        }
    }
}

impl<T, B: BoundedBuffer<T>> ChannelBuffer<T> for DropPolicyBuffer<T, B> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        match self.inner.try_push(value) {
            PushOutcome::Ok => PushOutcome::Ok,
            PushOutcome::Full(value) => match self.policy {
                DropPolicy::Block => PushOutcome::Full(value),
                DropPolicy::Newest => {
                    self.notify_drop(value);
                    PushOutcome::Ok
                }
                DropPolicy::Oldest => {
                    if let Some(dropped) = self.inner.try_pop() {
                        self.notify_drop(dropped);
                        match self.inner.try_push(value) {
                            PushOutcome::Ok => PushOutcome::Ok,
                            // A concurrent waiter absorbed the freed slot
                            // between our pop and retry: propagate the
                            // original failure rather than drop twice.
                            PushOutcome::Full(value) => PushOutcome::Full(value),
                        }
                    } else {
                        PushOutcome::Full(value)
                    }
                }
            },
        }
    }

    fn try_pop(&self) -> Option<T> {
        self.inner.try_pop()
    }

    fn try_pop_many(&self, max: usize) -> Vec<T> {
        self.inner.try_pop_many(max)
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        self.inner.add_pop_waiter()
    }

    fn wake_all_push_waiters(&self) {
        self.inner.wake_all_push_waiters();
    }

    fn fail_all_pop_waiters(&self) {
        self.inner.fail_all_pop_waiters();
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn len_hint(&self) -> usize {
        self.inner.len_hint()
    }
}

impl<T, B: BoundedBuffer<T>> BoundedBuffer<T> for DropPolicyBuffer<T, B> {
    fn sender_signal(&self) -> &async_event::Event {
        self.inner.sender_signal()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::bounded::BoundedFifo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn oldest_policy_drops_the_head() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped2 = dropped.clone();
        let wrapped = DropPolicyBuffer::new(
            BoundedFifo::new(4),
            DropPolicy::Oldest,
            Some(Arc::new(move |_: i32| {
                dropped2.fetch_add(1, Ordering::SeqCst);
            })),
        );
        for i in 0..10 {
            assert!(matches!(wrapped.try_push(i), PushOutcome::Ok));
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 6);
        let mut drained = Vec::new();
        while let Some(v) = wrapped.try_pop() {
            drained.push(v);
        }
        assert_eq!(drained, vec![6, 7, 8, 9]);
    }

    #[test]
    fn newest_policy_drops_incoming_value() {
        let wrapped = DropPolicyBuffer::<i32, _>::new(BoundedFifo::new(2), DropPolicy::Newest, None);
        assert!(matches!(wrapped.try_push(1), PushOutcome::Ok));
        assert!(matches!(wrapped.try_push(2), PushOutcome::Ok));
        assert!(matches!(wrapped.try_push(3), PushOutcome::Ok));
        assert_eq!(wrapped.try_pop(), Some(1));
        assert_eq!(wrapped.try_pop(), Some(2));
        assert_eq!(wrapped.try_pop(), None);
    }

    #[test]
    fn on_drop_panic_is_swallowed() {
        let wrapped = DropPolicyBuffer::new(
            BoundedFifo::new(1),
            DropPolicy::Newest,
            Some(Arc::new(|_: i32| panic!("boom"))),
        );
        assert!(matches!(wrapped.try_push(1), PushOutcome::Ok));
        // The slot is still occupied by 1; pushing 2 triggers the (panicking)
        // observer but must not corrupt the buffer.
        assert!(matches!(wrapped.try_push(2), PushOutcome::Ok));
        assert_eq!(wrapped.try_pop(), Some(1));
    }
}
