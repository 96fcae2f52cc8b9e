//! Fair selection engine: races receive, send, timer, stream and arbitrary
//! future branches into a single `await`.
//!
//! A [`SelectBuilder`] accumulates branches in the order they are added,
//! then [`SelectBuilder::run`] rotates that order (unless [`ordered`] was
//! called) so that repeated calls over the same always-ready set of
//! branches do not always hand the win to the first one. Every branch that
//! does not win is canceled exactly once, whether it lost a real race or
//! was never even polled because an earlier branch resolved synchronously.
//!
//! [`ordered`]: SelectBuilder::ordered

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_core::Stream;

use crate::result::RecvTimeoutError;

/// A selectable source: either already resolved, or pending with an
/// associated cancellation callback.
///
/// `Pending`'s future is polled like any other branch; its cancellation
/// callback runs once, and only once, if this arm turns out not to be the
/// one that resolves the surrounding select.
pub enum Arm<'a, T> {
    /// Synchronously ready.
    Immediate(T),
    /// Not yet resolved.
    Pending(
        Pin<Box<dyn Future<Output = T> + Send + 'a>>,
        Box<dyn FnMut() + Send + 'a>,
    ),
}

/// A future produced by a selectable source that also knows how to cancel
/// itself. Every branch a [`SelectBuilder`] attaches is adapted to this
/// trait, whatever its original shape (a plain future, an `Arm`, a
/// cancelable receive, ...).
trait Branch<R>: Future<Output = R> + Unpin + Send {
    /// Called at most once, on every branch that does not win the select.
    /// The default no-op is correct for plain futures and streams: dropping
    /// them (when the `Select` future itself is dropped) is cancellation
    /// enough. Sources with an external waiter to release (cancelable
    /// receives, `Arm::Pending`) override this.
    fn cancel(&mut self) {}
}

/// Adapts a plain future (or an `Arm`) into a [`Branch`], applying `body`
/// to its output.
struct MapBranch<F, B> {
    fut: F,
    body: Option<B>,
}

// `fut` is always a `Pin<Box<dyn Future>>` at every construction site in
// this module: the box already gives it a stable heap address, so moving
// the `MapBranch` itself around is harmless and it can be unconditionally
// `Unpin` regardless of what `F`/`B` happen to be.
impl<F, B> Unpin for MapBranch<F, B> {}

impl<F: Future + Unpin, B: FnOnce(F::Output) -> R, R> Future for MapBranch<F, B> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        match Pin::new(&mut this.fut).poll(cx) {
            Poll::Ready(v) => Poll::Ready(this.body.take().expect("polled after completion")(v)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: Future + Unpin + Send, B: FnOnce(F::Output) -> R + Send, R> Branch<R> for MapBranch<F, B> {}

/// Adapts an [`Arm`] into a [`Branch`], running its cancel callback (if
/// any) when this branch loses.
enum ArmBranch<'a, T, B> {
    Ready(Option<T>, Option<B>),
    Pending(
        Pin<Box<dyn Future<Output = T> + Send + 'a>>,
        Box<dyn FnMut() + Send + 'a>,
        Option<B>,
    ),
}

// Same reasoning as `MapBranch`: the only future this holds is already
// boxed and pinned; `T`/`B` are plain values moved out via `take()`, never
// structurally pinned.
impl<'a, T, B> Unpin for ArmBranch<'a, T, B> {}

impl<'a, T, B: FnOnce(T) -> R, R> Future for ArmBranch<'a, T, B> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        match this {
            ArmBranch::Ready(v, body) => {
                Poll::Ready(body.take().expect("polled after completion")(
                    v.take().expect("polled after completion"),
                ))
            }
            ArmBranch::Pending(fut, _, body) => match fut.as_mut().poll(cx) {
                Poll::Ready(v) => Poll::Ready(body.take().expect("polled after completion")(v)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<'a, T: Send, B: FnOnce(T) -> R + Send, R> Branch<R> for ArmBranch<'a, T, B> {
    fn cancel(&mut self) {
        if let ArmBranch::Pending(_, cancel, _) = self {
            cancel();
        }
    }
}

/// Races a [`Stream`]'s next item; the branch never resolves again once the
/// stream has ended (it simply stays `Pending` forever, so a select relying
/// only on an exhausted stream should be paired with a timeout).
struct StreamBranch<S, B> {
    stream: Pin<Box<S>>,
    body: Option<B>,
}

// The stream is boxed and pinned in place; `S` need not itself be `Unpin`.
impl<S, B> Unpin for StreamBranch<S, B> {}

impl<S: Stream, B: FnOnce(S::Item) -> R, R> Future for StreamBranch<S, B> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        match this.stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(v)) => Poll::Ready(this.body.take().expect("polled after completion")(v)),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: Stream + Send, B: FnOnce(S::Item) -> R + Send, R> Branch<R> for StreamBranch<S, B> {}

/// A receive operation that can be abandoned mid-wait: the contract shared
/// by [`crate::ops::RecvCancelable`] and [`crate::handles::broadcast::RecvCancelable`],
/// letting [`SelectBuilder::on_recv`] accept either.
pub trait CancelableRecv<T>: Future<Output = Result<T, RecvTimeoutError>> + Unpin + Send {
    /// Abandons the wait; see the concrete type's own `cancel` for the
    /// idempotency contract.
    fn cancel_recv(&mut self) -> bool;
}

impl<T: Send> CancelableRecv<T> for crate::ops::RecvCancelable<T> {
    fn cancel_recv(&mut self) -> bool {
        self.cancel()
    }
}

impl<'a, T: Send + Sync + Clone + 'static> CancelableRecv<T> for crate::handles::broadcast::RecvCancelable<'a, T> {
    fn cancel_recv(&mut self) -> bool {
        self.cancel()
    }
}

struct RecvBranch<C, B> {
    cancelable: C,
    body: Option<B>,
}

// `body` is only ever moved out via `.take()`, never structurally pinned, so
// the wrapper is Unpin regardless of `B` (and `C: CancelableRecv<T>` is
// already Unpin by supertrait, but that bound isn't visible to an
// auto-derived impl over the bare generic parameters).
impl<C, B> Unpin for RecvBranch<C, B> {}

impl<T, C: CancelableRecv<T>, B: FnOnce(Result<T, RecvTimeoutError>) -> R, R> Future for RecvBranch<C, B> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        match Pin::new(&mut this.cancelable).poll(cx) {
            Poll::Ready(v) => Poll::Ready(this.body.take().expect("polled after completion")(v)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send, C: CancelableRecv<T> + Send, B: FnOnce(Result<T, RecvTimeoutError>) -> R + Send, R> Branch<R>
    for RecvBranch<C, B>
{
    fn cancel(&mut self) {
        self.cancelable.cancel_recv();
    }
}

fn now_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

/// Accumulates typed branches and runs them as one fairly-rotated select.
///
/// ```
/// # use polychan::select::SelectBuilder;
/// # use polychan::handles::mpsc;
/// # futures_executor::block_on(async {
/// let (tx, mut rx) = mpsc::channel::<i32>(1);
/// tx.try_send(7).unwrap();
/// let winner = SelectBuilder::new()
///     .on_recv(rx.recv_cancelable(), |v| v)
///     .run()
///     .await;
/// assert_eq!(winner, Ok(7));
/// # });
/// ```
pub struct SelectBuilder<'a, R> {
    branches: Vec<Box<dyn Branch<R> + 'a>>,
    timeout: Option<Box<dyn Branch<R> + 'a>>,
    ordered: bool,
}

impl<'a, R: 'a> Default for SelectBuilder<'a, R> {
    fn default() -> Self {
        Self {
            branches: Vec::new(),
            timeout: None,
            ordered: false,
        }
    }
}

impl<'a, R: 'a> SelectBuilder<'a, R> {
    /// Starts with no branches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables fairness rotation: branches are always attached in the
    /// order they were added.
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Adds a branch that resolves when `fut` completes.
    pub fn on_future<Fut, B, T>(mut self, fut: Fut, body: B) -> Self
    where
        Fut: Future<Output = T> + Send + 'a,
        B: FnOnce(T) -> R + Send + 'a,
        T: 'a,
    {
        let branch = MapBranch {
            fut: Box::pin(fut) as Pin<Box<dyn Future<Output = T> + Send + 'a>>,
            body: Some(body),
        };
        self.branches.push(Box::new(branch));
        self
    }

    /// Adds a branch that resolves with the first item `stream` produces.
    /// Canceled (by dropping the stream) if another branch wins first.
    pub fn on_stream<S, B>(mut self, stream: S, body: B) -> Self
    where
        S: Stream + Send + 'a,
        B: FnOnce(S::Item) -> R + Send + 'a,
    {
        let branch = StreamBranch {
            stream: Box::pin(stream),
            body: Some(body),
        };
        self.branches.push(Box::new(branch));
        self
    }

    /// Adds a branch racing a cancelable receive — the value returned by
    /// `rx.recv_cancelable()` on any flavor's receiver. The canceller is
    /// registered automatically: if this branch loses, the pending waiter
    /// is removed from its buffer.
    pub fn on_recv<T, C, B>(mut self, cancelable: C, body: B) -> Self
    where
        T: Send + 'a,
        C: CancelableRecv<T> + Send + 'a,
        B: FnOnce(Result<T, RecvTimeoutError>) -> R + Send + 'a,
    {
        let branch = RecvBranch {
            cancelable,
            body: Some(body),
        };
        self.branches.push(Box::new(branch));
        self
    }

    /// Adds a branch racing a send completion — pass the future returned by
    /// a sender's `send`/`send_timeout`.
    pub fn on_send<Fut, B, T>(self, fut: Fut, body: B) -> Self
    where
        Fut: Future<Output = T> + Send + 'a,
        B: FnOnce(T) -> R + Send + 'a,
        T: 'a,
    {
        self.on_future(fut, body)
    }

    /// Adds a branch backed by an externally supplied one-shot delay (the
    /// timer itself is an external collaborator this crate does not own —
    /// bring whatever `Future<Output = ()>` your runtime provides).
    pub fn on_delay<D, B>(mut self, delay: D, body: B) -> Self
    where
        D: Future<Output = ()> + Send + 'a,
        B: FnOnce() -> R + Send + 'a,
    {
        let branch = MapBranch {
            fut: Box::pin(delay) as Pin<Box<dyn Future<Output = ()> + Send + 'a>>,
            body: Some(move |()| body()),
        };
        self.branches.push(Box::new(branch));
        self
    }

    /// Adds the dedicated global-timeout fallback. Unlike every other
    /// branch, it is appended after fairness rotation, so it never jumps
    /// ahead of a ready branch and never gets starved by the rotation
    /// offset either.
    pub fn timeout<D, B>(mut self, delay: D, body: B) -> Self
    where
        D: Future<Output = ()> + Send + 'a,
        B: FnOnce() -> R + Send + 'a,
    {
        let branch = MapBranch {
            fut: Box::pin(delay) as Pin<Box<dyn Future<Output = ()> + Send + 'a>>,
            body: Some(move |()| body()),
        };
        self.timeout = Some(Box::new(branch));
        self
    }

    /// Adds a branch from a generic [`Arm`] source (e.g. [`crate::ticker::Ticker::arm`]).
    pub fn on_arm<T, B>(mut self, arm: Arm<'a, T>, body: B) -> Self
    where
        T: Send + 'a,
        B: FnOnce(T) -> R + Send + 'a,
    {
        let branch = match arm {
            Arm::Immediate(v) => ArmBranch::Ready(Some(v), Some(body)),
            Arm::Pending(fut, cancel) => ArmBranch::Pending(fut, cancel, Some(body)),
        };
        self.branches.push(Box::new(branch));
        self
    }

    /// Tries only the branches that are synchronously ready (an `Arm`
    /// constructed as `Immediate`, or a cancelable receive/send/future that
    /// happened to resolve on its very first poll), without registering any
    /// waiters. Returns `None` if nothing was immediately ready; every
    /// branch not chosen is canceled exactly as in [`Self::run`].
    pub fn sync_run(self) -> Option<R> {
        let noop_waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&noop_waker);
        let mut branches = self.branches;
        if let Some(timeout) = self.timeout {
            branches.push(timeout);
        }
        for i in 0..branches.len() {
            if let Poll::Ready(v) = Pin::new(&mut *branches[i]).poll(&mut cx) {
                cancel_all_but(&mut branches, i);
                return Some(v);
            }
        }
        // Nothing resolved synchronously: cancel every branch we touched
        // (harmless no-op for ones with no external waiter) and give up.
        cancel_all_but(&mut branches, usize::MAX);
        None
    }

    /// Rotates the branch order (unless [`Self::ordered`] was called),
    /// appends the global timeout branch if one was set, and returns the
    /// future that drives the race.
    pub fn run(self) -> Select<'a, R> {
        let mut branches = self.branches;
        if !self.ordered {
            let n = branches.len();
            if n > 1 {
                let offset = (now_micros() % n as u128) as usize;
                branches.rotate_left(offset);
            }
        }
        if let Some(timeout) = self.timeout {
            branches.push(timeout);
        }
        Select {
            branches: Some(branches),
        }
    }
}

fn cancel_all_but<R>(branches: &mut [Box<dyn Branch<R> + '_>], winner: usize) {
    for (i, branch) in branches.iter_mut().enumerate() {
        if i != winner {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| branch.cancel()));
        }
    }
}

/// The future returned by [`SelectBuilder::run`].
pub struct Select<'a, R> {
    branches: Option<Vec<Box<dyn Branch<R> + 'a>>>,
}

impl<'a, R> Future for Select<'a, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        let branches = this
            .branches
            .as_mut()
            .expect("Select polled after completion");
        for i in 0..branches.len() {
            if let Poll::Ready(v) = Pin::new(&mut *branches[i]).poll(cx) {
                let mut branches = this.branches.take().unwrap();
                cancel_all_but(&mut branches, i);
                return Poll::Ready(v);
            }
        }
        Poll::Pending
    }
}

impl<'a, R> Drop for Select<'a, R> {
    fn drop(&mut self) {
        // The select was abandoned (e.g. raced against an outer timeout)
        // before any branch won: release every waiter it may hold.
        if let Some(mut branches) = self.branches.take() {
            cancel_all_but(&mut branches, usize::MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::mpsc;
    use futures_executor::block_on;
    use std::collections::HashSet;

    #[test]
    fn immediate_recv_wins_without_polling_later_branches() {
        let (tx1, mut rx1) = mpsc::channel::<i32>(1);
        let (_tx2, mut rx2) = mpsc::channel::<i32>(1);
        tx1.try_send(42).unwrap();
        let winner = block_on(
            SelectBuilder::new()
                .ordered()
                .on_recv(rx1.recv_cancelable(), |v| v)
                .on_recv(rx2.recv_cancelable(), |v| v)
                .run(),
        );
        assert_eq!(winner, Ok(42));
    }

    #[test]
    fn losing_branch_cancel_releases_waiter_for_a_later_send() {
        let (tx1, mut rx1) = mpsc::channel::<i32>(1);
        let (tx2, mut rx2) = mpsc::channel::<i32>(1);
        tx2.try_send(99).unwrap();
        let winner = block_on(
            SelectBuilder::new()
                .ordered()
                .on_recv(rx1.recv_cancelable(), |v| ("rx1", v))
                .on_recv(rx2.recv_cancelable(), |v| ("rx2", v))
                .run(),
        );
        assert_eq!(winner.1, Ok(99));
        assert_eq!(winner.0, "rx2");
        // rx1's canceled waiter did not consume anything; a later send
        // still reaches it normally.
        tx1.try_send(7).unwrap();
        assert_eq!(rx1.try_recv(), Ok(7));
    }

    #[test]
    fn fairness_every_branch_wins_at_least_once_over_many_runs() {
        let mut wins = HashSet::new();
        for _ in 0..200 {
            let (tx1, mut rx1) = mpsc::channel::<i32>(1);
            let (tx2, mut rx2) = mpsc::channel::<i32>(1);
            tx1.try_send(1).unwrap();
            tx2.try_send(2).unwrap();
            let winner = block_on(
                SelectBuilder::new()
                    .on_recv(rx1.recv_cancelable(), |_| 1)
                    .on_recv(rx2.recv_cancelable(), |_| 2)
                    .run(),
            );
            wins.insert(winner);
            if wins.len() == 2 {
                break;
            }
        }
        assert_eq!(wins, HashSet::from([1, 2]));
    }

    #[test]
    fn sync_run_returns_none_when_nothing_is_ready() {
        let (_tx, mut rx) = mpsc::channel::<i32>(1);
        let result = SelectBuilder::new()
            .on_recv(rx.recv_cancelable(), |v: Result<i32, RecvTimeoutError>| v)
            .sync_run();
        assert!(result.is_none());
    }

    #[test]
    fn timeout_branch_never_jumps_ahead_of_rotation() {
        let (_tx, mut rx) = mpsc::channel::<i32>(1);
        let winner = block_on(
            SelectBuilder::new()
                .on_recv(rx.recv_cancelable(), |_| "recv")
                .timeout(std::future::ready(()), || "timeout")
                .run(),
        );
        assert_eq!(winner, "timeout");
    }
}
