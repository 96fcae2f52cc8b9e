//! The uniform contract every buffer flavor implements, so that the
//! `ops` and `select` layers stay entirely flavor-agnostic.

use crate::waiter::PopWaiter;

/// Outcome of a non-blocking push attempt.
pub(crate) enum PushOutcome<T> {
    /// The value was accepted (either stored, or handed directly to a
    /// waiting popper).
    Ok,
    /// No space is available (and, for the rendezvous flavor, no popper is
    /// currently waiting).
    Full(T),
}

/// The storage and wake-protocol contract shared by every channel flavor.
///
/// Implementors are not responsible for disconnection bookkeeping — that is
/// the job of [`crate::lifecycle::Lifecycle`], composed alongside a buffer
/// inside [`crate::core::ChannelCore`]. A buffer only reports "full" or
/// "empty"; the core decides what "full" or "empty" plus "closed" means for
/// the caller.
///
/// All methods here are synchronous and must not yield: the only suspension
/// points in this crate are the futures built on top of
/// [`ChannelBuffer::add_pop_waiter`]/[`ChannelBuffer::add_push_waiter`].
pub(crate) trait ChannelBuffer<T>: Send + Sync {
    /// Attempts to push a value without blocking.
    ///
    /// A successful push that lands on a parked popper must hand the value
    /// directly to that popper (the "bypass" path) rather than enqueuing it,
    /// per the data-model contract.
    fn try_push(&self, value: T) -> PushOutcome<T>;

    /// Attempts to pop a value without blocking.
    fn try_pop(&self) -> Option<T>;

    /// Attempts to pop up to `max` values without blocking, in FIFO order.
    /// The default implementation calls `try_pop` in a loop; flavors with a
    /// cheaper bulk-drain path (chunked, SRSW ring) override it.
    fn try_pop_many(&self, max: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(max.min(16));
        while out.len() < max {
            match self.try_pop() {
                Some(v) => out.push(v),
                None => break,
            }
        }
        out
    }

    /// Registers a pop-waiter. Implementations must first retry `try_pop`
    /// synchronously to close the race with a concurrently completed push;
    /// if that retry succeeds the returned waiter is already resolved
    /// ([`PopWaiter::Ready`]).
    fn add_pop_waiter(&self) -> PopWaiter<T>;

    /// Wakes every parked push-waiter (used when the receiver side closes,
    /// so blocked senders observe the new disconnected state).
    fn wake_all_push_waiters(&self);

    /// Fails every parked pop-waiter with `Disconnected`, in arrival order.
    fn fail_all_pop_waiters(&self);

    /// Drops all currently stored values (used when the receiver side
    /// closes).
    fn clear(&self);

    /// Count of items currently stored, used by the lifecycle layer to
    /// decide `recvDisconnected` (closed senders + drained buffer). Must be
    /// exact at the instant of the call from the buffer's single logical
    /// consumer's point of view: it may race a few instants stale against a
    /// concurrent producer (in which case it under-reports disconnection,
    /// never over-reports it), but it must never read as zero while a value
    /// a `try_pop` could still return is sitting in storage.
    fn len_hint(&self) -> usize;
}

/// Implemented by buffers that can block a producer (i.e. have finite
/// capacity): bounded, rendezvous, SRSW, promise. Unbounded and chunked
/// buffers never implement this since `try_push` never fails for them.
///
/// The wake side is [`async_event::Event`] rather than the `PopWaiter`
/// machinery: several producers may legitimately be parked on the same
/// bounded buffer at once (MPSC, MPMC), which is exactly the many-waiters
/// case `Event` exists for. Its `wait_until` already encodes the slow-path
/// loop from the data model ("await `waitNotFull` then retry `tryPush`") as
/// a single retrying predicate, so `ops::send` builds directly on it instead
/// of re-deriving the loop.
pub(crate) trait BoundedBuffer<T>: ChannelBuffer<T> {
    /// The event signaled whenever a slot frees up (a pop happened) or the
    /// channel is closed.
    fn sender_signal(&self) -> &async_event::Event;

    /// The maximum number of values this buffer can hold.
    fn capacity(&self) -> usize;
}

/// A type-erased bounded buffer, used by flavors (`mpsc`, `mpmc`) whose
/// factory functions choose among several concrete buffer types at
/// construction time (unbounded, chunked, bounded, rendezvous, latest-only)
/// but must hand back a single, uniformly-typed `Sender`/`Receiver` pair.
/// `ChannelBuffer`/`BoundedBuffer` have no generic methods or `Self`-typed
/// returns, so both are object-safe; the cost is one vtable indirection per
/// call on these flavors, traded for a single monomorphization of
/// `ChannelCore`/`ops`/the handle types per flavor instead of one per buffer
/// variant.
pub(crate) type DynBoundedBuffer<T> = Box<dyn BoundedBuffer<T>>;

impl<T> ChannelBuffer<T> for DynBoundedBuffer<T> {
    fn try_push(&self, value: T) -> PushOutcome<T> {
        (**self).try_push(value)
    }

    fn try_pop(&self) -> Option<T> {
        (**self).try_pop()
    }

    fn try_pop_many(&self, max: usize) -> Vec<T> {
        (**self).try_pop_many(max)
    }

    fn add_pop_waiter(&self) -> PopWaiter<T> {
        (**self).add_pop_waiter()
    }

    fn wake_all_push_waiters(&self) {
        (**self).wake_all_push_waiters();
    }

    fn fail_all_pop_waiters(&self) {
        (**self).fail_all_pop_waiters();
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn len_hint(&self) -> usize {
        (**self).len_hint()
    }
}

impl<T> BoundedBuffer<T> for DynBoundedBuffer<T> {
    fn sender_signal(&self) -> &async_event::Event {
        (**self).sender_signal()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}
