//! Waiter handles: one-shot completion cells used by every buffer flavor to
//! park a pop (or push) operation until data, space, or disconnection
//! arrives.
//!
//! Two concrete strategies are provided. [`SingleWaiterSlot`] is a
//! zero-allocation fast slot built on [`diatomic_waker::DiatomicWaker`],
//! valid whenever a buffer flavor guarantees that at most one task can ever
//! be parked on it at a time (every receiver-side wait in this crate except
//! MPMC and broadcast, and every sender-side wait since a full bounded
//! buffer exposes its backpressure through [`async_event::Event`] rather
//! than through this module). [`MultiWaiterQueue`] is the general fallback
//! for flavors where several tasks may legitimately be parked concurrently
//! (MPMC pop, broadcast pop): a FIFO of individually cancellable completion
//! cells guarded by a mutex.
//!
//! Both are wrapped by [`PopWaiter`], the uniform handle type the
//! `ChannelBuffer` contract exposes, so callers (the `ops` and `select`
//! layers) never need to know which strategy a given flavor picked.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use diatomic_waker::primitives::DiatomicWaker;

/// The result delivered to a parked pop-waiter.
pub(crate) enum WaiterOutcome<T> {
    /// A value became available (directly handed off, bypassing storage).
    Value(T),
    /// The channel transitioned to disconnected while this waiter was
    /// parked.
    Disconnected,
}

/// A single slot for exactly one concurrently parked waiter.
///
/// Safety/contract: callers must not call [`SingleWaiterSlot::register`]
/// from two distinct tasks concurrently without an intervening resolution;
/// every buffer flavor that uses this type has at most one logical consumer
/// at a time, so this is always upheld by construction.
pub(crate) struct SingleWaiterSlot<T> {
    waiting: AtomicBool,
    handoff: Mutex<Option<WaiterOutcome<T>>>,
    waker: DiatomicWaker,
}

impl<T> SingleWaiterSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            waiting: AtomicBool::new(false),
            handoff: Mutex::new(None),
            waker: DiatomicWaker::new(),
        }
    }

    /// Registers interest in a value. Returns `false` if a waiter is already
    /// registered (the caller raced with itself across a cancellation, which
    /// should not happen given the single-consumer contract, but is reported
    /// rather than causing unsafety).
    fn try_register(&self) -> bool {
        self.waiting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Attempts to directly hand a value to a registered waiter, bypassing
    /// the buffer's own storage. Returns the value back if no waiter is
    /// currently registered.
    pub(crate) fn try_bypass(&self, value: T) -> Result<(), T> {
        // The CAS must happen before the handoff is written and before any
        // notification: it is the single arbiter between a concurrent
        // `cancel()`/`fail()` and this bypass, so exactly one of them ever
        // "wins" a given waiting waiter and the value can never be written
        // into a handoff nobody will read.
        if self
            .waiting
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(value);
        }
        *self.handoff.lock().unwrap() = Some(WaiterOutcome::Value(value));
        self.waker.notify();
        Ok(())
    }

    /// Wakes the registered waiter (if any) with `Disconnected`.
    pub(crate) fn fail(&self) {
        if self
            .waiting
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.handoff.lock().unwrap() = Some(WaiterOutcome::Disconnected);
            self.waker.notify();
        }
    }

    pub(crate) fn ticket(self: &Arc<Self>) -> SingleWaitTicket<T> {
        SingleWaitTicket {
            slot: self.clone(),
            registered: false,
        }
    }
}

/// A handle to a (possibly not yet registered) single-consumer wait.
pub(crate) struct SingleWaitTicket<T> {
    slot: Arc<SingleWaiterSlot<T>>,
    registered: bool,
}

impl<T> SingleWaitTicket<T> {
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<WaiterOutcome<T>> {
        if !self.registered {
            if !self.slot.try_register() {
                // Another waiter is somehow already parked; treat this as a
                // spurious wake and report disconnection rather than
                // violating the single-waiter invariant.
                return Poll::Ready(WaiterOutcome::Disconnected);
            }
            self.registered = true;
        }
        // Safety: single logical registrant, as established above.
        unsafe { self.slot.waker.register(cx.waker()) };
        if let Some(outcome) = self.slot.handoff.lock().unwrap().take() {
            self.registered = false;
            self.slot.waker.unregister();
            return Poll::Ready(outcome);
        }
        Poll::Pending
    }

    /// Removes this waiter if it is still pending. Returns `true` if the
    /// removal happened before any completion was observed. On `false`, a
    /// value or disconnection already raced ahead of this call — the ticket
    /// is left registered so a subsequent [`Self::poll`] still observes and
    /// returns it, rather than discarding it here.
    pub(crate) fn cancel(&mut self) -> bool {
        if !self.registered {
            return true;
        }
        let removed = self
            .slot
            .waiting
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if removed {
            self.slot.waker.unregister();
            self.registered = false;
        }
        removed
    }
}

// A ticket dropped mid-wait (e.g. the owning `Recv`/`RecvCancelable` future
// lost a race against a foreign `select!`/timeout that never called
// `cancel()` explicitly) must still vacate the slot. Without this, the
// slot's `waiting` flag would stay set forever, and every subsequent
// `add_pop_waiter` on a single-consumer buffer would spuriously observe
// "someone is already waiting" and report `Disconnected` on a channel that
// never actually closed.
impl<T> Drop for SingleWaitTicket<T> {
    fn drop(&mut self) {
        if self.registered {
            self.cancel();
        }
    }
}

/// A single cell in a [`MultiWaiterQueue`]: an individually cancellable,
/// exactly-once completion.
pub(crate) struct WaiterCell<T> {
    state: Mutex<WaiterCellState<T>>,
}

struct WaiterCellState<T> {
    outcome: Option<WaiterOutcome<T>>,
    waker: Option<Waker>,
    removed: bool,
}

impl<T> WaiterCell<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WaiterCellState {
                outcome: None,
                waker: None,
                removed: false,
            }),
        })
    }

    /// Completes the cell exactly once. On failure (the cell already
    /// completed or lost a race with its own cancellation), hands the
    /// outcome back so the caller can try a different waiter.
    pub(crate) fn complete(&self, outcome: WaiterOutcome<T>) -> Result<(), WaiterOutcome<T>> {
        let mut state = self.state.lock().unwrap();
        if state.outcome.is_some() || state.removed {
            return Err(outcome);
        }
        state.outcome = Some(outcome);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
        Ok(())
    }

    fn poll(&self, cx: &mut Context<'_>) -> Poll<WaiterOutcome<T>> {
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = state.outcome.take() {
            return Poll::Ready(outcome);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Marks the cell as removed so that a completion racing the removal is
    /// observed as a no-op by [`WaiterCell::complete`]. Returns `true` if the
    /// cell had not already completed.
    fn mark_removed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.outcome.is_some() {
            return false;
        }
        state.removed = true;
        true
    }
}

/// A FIFO of cancellable pop-waiters for flavors with more than one
/// concurrent consumer (MPMC, broadcast).
pub(crate) struct MultiWaiterQueue<T> {
    queue: Mutex<VecDeque<Arc<WaiterCell<T>>>>,
}

impl<T> MultiWaiterQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn add(&self) -> Arc<WaiterCell<T>> {
        let cell = WaiterCell::new();
        self.queue.lock().unwrap().push_back(cell.clone());
        cell
    }

    pub(crate) fn remove(&self, cell: &Arc<WaiterCell<T>>) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if let Some(pos) = queue.iter().position(|c| Arc::ptr_eq(c, cell)) {
            queue.remove(pos);
            cell.mark_removed()
        } else {
            // Already popped off the queue (likely already completed).
            cell.mark_removed()
        }
    }

    /// Pops the earliest still-pending waiter, for use as the bypass target
    /// of a push.
    pub(crate) fn pop_one(&self) -> Option<Arc<WaiterCell<T>>> {
        let mut queue = self.queue.lock().unwrap();
        while let Some(cell) = queue.pop_front() {
            // Skip cells that have already been canceled/completed: the
            // bypass must land on a genuinely still-waiting consumer.
            if !cell.state.lock().unwrap().removed {
                return Some(cell);
            }
        }
        None
    }

    pub(crate) fn fail_all(&self) {
        let mut queue = self.queue.lock().unwrap();
        while let Some(cell) = queue.pop_front() {
            let _ = cell.complete(WaiterOutcome::Disconnected);
        }
    }

    /// Resolves every currently queued waiter with a (cloned) value rather
    /// than draining the queue for a single consumer. Used by flavors where
    /// a push fans out to every parked reader instead of handing off to
    /// exactly one (the broadcast ring).
    pub(crate) fn wake_all(&self, value: T)
    where
        T: Clone,
    {
        let mut queue = self.queue.lock().unwrap();
        for cell in queue.drain(..) {
            let _ = cell.complete(WaiterOutcome::Value(value.clone()));
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

/// A uniform pop-waiter handle, regardless of which concurrency strategy the
/// owning buffer picked. Implements [`Future`] so it can be `.await`ed
/// directly by `recv`, and exposes an explicit, idempotent [`cancel`] for
/// `recv_cancelable` and the selection engine.
///
/// [`cancel`]: PopWaiter::cancel
pub(crate) enum PopWaiter<T> {
    Single(SingleWaitTicket<T>),
    Multi(Arc<WaiterCell<T>>, Arc<MultiWaiterQueue<T>>),
    /// Already resolved at registration time: a value (or disconnect) landed
    /// between the caller's own failed `try_pop` and this waiter being
    /// registered, so registration itself must retry `try_pop` once more.
    Ready(WaiterOutcome<T>),
}

impl<T> PopWaiter<T> {
    /// Removes this waiter from its owning queue if it hasn't completed yet.
    /// Returns `true` if the removal raced ahead of any completion; `false`
    /// if a value or disconnection had already arrived, in which case `self`
    /// is left intact and a subsequent `poll` still returns that outcome
    /// rather than losing it.
    pub(crate) fn cancel(&mut self) -> bool {
        match self {
            PopWaiter::Single(ticket) => ticket.cancel(),
            PopWaiter::Multi(cell, queue) => queue.remove(cell),
            PopWaiter::Ready(_) => false,
        }
    }
}

// `PopWaiter` holds no address-sensitive self-references; it is sound to
// treat it as movable regardless of whether `T` itself is `Unpin`.
impl<T> Unpin for PopWaiter<T> {}

// `Single`'s cleanup is handled by `SingleWaitTicket`'s own `Drop` impl.
// `Multi` needs its cell removed from the queue here so a waiter dropped
// without an explicit `cancel()` (a foreign `select!` branch, a bare
// `Stream::poll_next` future discarded after `Pending`) does not linger as
// a dead entry `pop_one` has to skip over indefinitely.
impl<T> Drop for PopWaiter<T> {
    fn drop(&mut self) {
        if let PopWaiter::Multi(cell, queue) = self {
            queue.remove(cell);
        }
    }
}

impl<T> Future for PopWaiter<T> {
    type Output = WaiterOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this {
            PopWaiter::Single(ticket) => ticket.poll(cx),
            PopWaiter::Multi(cell, _) => cell.poll(cx),
            PopWaiter::Ready(_) => {
                let prev = std::mem::replace(this, PopWaiter::Single(SingleWaitTicket {
                    slot: Arc::new(SingleWaiterSlot::new()),
                    registered: false,
                }));
                let PopWaiter::Ready(outcome) = prev else {
                    unreachable!()
                };
                Poll::Ready(outcome)
            }
        }
    }
}
