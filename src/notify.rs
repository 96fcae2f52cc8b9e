//! `Notify`: a permits-and-waiters signal, independent of any channel.
//!
//! A call to [`Notify::notify_one`]/[`notify_n`](Notify::notify_n) either
//! wakes an already-parked [`Notify::notified`] caller directly, or — if
//! nobody is waiting yet — banks a permit that the next `notified()` call
//! consumes without suspending at all. This "at most N pending wakeups are
//! never lost" behavior is what distinguishes a permit-carrying `Notify`
//! from a plain condition variable. Built on [`MultiWaiterQueue`], the same
//! fan-out waiter queue the broadcast and MPMC buffers use, since any number
//! of tasks may legitimately be parked on one `Notify` at once.

use std::error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::waiter::{MultiWaiterQueue, PopWaiter, WaiterOutcome};

/// Error returned by a `notified()` future that did not complete with a
/// wakeup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyError {
    /// [`Notified::cancel`] was called before a wakeup arrived.
    Canceled,
    /// [`Notify::close`] was called before a wakeup arrived.
    Closed,
}

impl error::Error for NotifyError {}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Canceled => "the wait was canceled".fmt(f),
            NotifyError::Closed => "the Notify was closed".fmt(f),
        }
    }
}

/// A permits-and-waiters signal.
pub struct Notify {
    permits: AtomicUsize,
    waiters: Arc<MultiWaiterQueue<()>>,
    closed: AtomicBool,
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}

impl Notify {
    /// Creates a `Notify` with no banked permits and nobody waiting.
    pub fn new() -> Self {
        Self {
            permits: AtomicUsize::new(0),
            waiters: Arc::new(MultiWaiterQueue::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Wakes one waiting task, or banks a permit for a future `notified()`
    /// call if nobody is currently waiting.
    pub fn notify_one(&self) {
        self.notify_n(1);
    }

    /// Wakes every currently waiting task. Unlike `notify_one`/`notify_n`,
    /// this never banks a permit: a call with nobody waiting is a no-op.
    pub fn notify_all(&self) {
        self.waiters.wake_all(());
    }

    /// Wakes up to `n` waiting tasks, banking any remainder as permits for
    /// future `notified()` calls.
    pub fn notify_n(&self, n: usize) {
        let mut remaining = n;
        while remaining > 0 {
            match self.waiters.pop_one() {
                Some(cell) => {
                    if cell.complete(WaiterOutcome::Value(())).is_ok() {
                        remaining -= 1;
                    }
                }
                None => {
                    self.permits.fetch_add(remaining, Ordering::Release);
                    return;
                }
            }
        }
    }

    /// Returns a future that resolves once this `Notify` has a banked
    /// permit or is woken. Consumes exactly one permit/wakeup per
    /// resolution.
    pub fn notified(&self) -> Notified<'_> {
        Notified {
            notify: self,
            waiter: None,
            canceled: false,
        }
    }

    /// Fails every currently parked waiter with [`NotifyError::Closed`] and
    /// marks this `Notify` closed; further `notified()` calls immediately
    /// resolve with `Closed` regardless of banked permits.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.waiters.fail_all();
    }

    /// Returns `true` once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn try_consume_permit(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl fmt::Debug for Notify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notify").finish_non_exhaustive()
    }
}

/// A cancelable wait on a [`Notify`]. See [`crate::ops::RecvCancelable`] for
/// the matching cancellation contract used by channel receives.
pub struct Notified<'a> {
    notify: &'a Notify,
    waiter: Option<PopWaiter<()>>,
    canceled: bool,
}

impl<'a> Notified<'a> {
    /// Cancels the pending wait. Idempotent; returns `true` unless a
    /// completion had already raced ahead of the cancellation.
    pub fn cancel(&mut self) -> bool {
        if self.canceled {
            return true;
        }
        match &mut self.waiter {
            None => {
                self.canceled = true;
                true
            }
            Some(waiter) => {
                let removed = waiter.cancel();
                if removed {
                    self.canceled = true;
                }
                removed
            }
        }
    }
}

impl<'a> Future for Notified<'a> {
    type Output = Result<(), NotifyError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.canceled {
            return Poll::Ready(Err(NotifyError::Canceled));
        }
        if this.waiter.is_none() {
            if this.notify.try_consume_permit() {
                return Poll::Ready(Ok(()));
            }
            if this.notify.is_closed() {
                return Poll::Ready(Err(NotifyError::Closed));
            }
            let cell = this.notify.waiters.add();
            this.waiter = Some(PopWaiter::Multi(cell, this.notify.waiters.clone()));
        }
        let waiter = this.waiter.as_mut().unwrap();
        match Pin::new(waiter).poll(cx) {
            Poll::Ready(WaiterOutcome::Value(())) => {
                this.waiter = None;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(WaiterOutcome::Disconnected) => {
                this.waiter = None;
                Poll::Ready(Err(NotifyError::Closed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;
    use futures_task::noop_waker;

    #[test]
    fn notify_one_before_wait_banks_a_permit() {
        let notify = Notify::new();
        notify.notify_one();
        block_on(async {
            assert_eq!(notify.notified().await, Ok(()));
        });
    }

    #[test]
    fn notify_one_wakes_a_parked_waiter() {
        let notify = Notify::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = notify.notified();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        notify.notify_one();
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[test]
    fn notify_n_wakes_exactly_n_and_banks_the_rest() {
        let notify = Notify::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut a = notify.notified();
        let mut b = notify.notified();
        assert!(Pin::new(&mut a).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut b).poll(&mut cx).is_pending());
        notify.notify_n(3);
        assert_eq!(Pin::new(&mut a).poll(&mut cx), Poll::Ready(Ok(())));
        assert_eq!(Pin::new(&mut b).poll(&mut cx), Poll::Ready(Ok(())));
        block_on(async {
            assert_eq!(notify.notified().await, Ok(()));
        });
    }

    #[test]
    fn cancel_is_idempotent_and_does_not_consume_a_permit() {
        let notify = Notify::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = notify.notified();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        assert!(fut.cancel());
        assert!(fut.cancel());
        notify.notify_one();
        block_on(async {
            assert_eq!(notify.notified().await, Ok(()));
        });
    }

    #[test]
    fn close_fails_parked_waiters() {
        let notify = Notify::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = notify.notified();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        notify.close();
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Err(NotifyError::Closed)));
    }
}
