//! `Ticker`: a periodic [`Arm`] source with no catch-up for missed ticks.
//!
//! This crate owns no timer of its own — [`Ticker::arm`] takes a closure
//! that turns a remaining [`Duration`] into whatever one-shot delay future
//! the caller's runtime provides, the same pattern [`crate::select`]'s
//! `on_delay`/`timeout` use.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::select::Arm;

/// Stores a fixed `period` and the instant the next tick is due. Each
/// [`arm`](Ticker::arm) call either fires immediately (advancing `next_at`
/// by exactly one `period`) or hands back a pending branch that advances
/// `next_at` itself once the caller-supplied delay actually fires.
///
/// Missed ticks are never queued: if two periods elapse between `arm`
/// calls, the next call still only advances `next_at` by one `period`, so
/// ticks can drift later relative to wall-clock time but never pile up.
pub struct Ticker {
    period: Duration,
    next_at: Mutex<Instant>,
}

impl Ticker {
    /// Creates a ticker whose first tick is due one `period` from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_at: Mutex::new(Instant::now() + period),
        }
    }

    /// This ticker's period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The instant the next tick is currently due.
    pub fn next_at(&self) -> Instant {
        *self.next_at.lock().unwrap()
    }

    /// Arms one tick. If it is already due, resolves synchronously and
    /// advances `next_at` by one `period`; otherwise builds a delay for the
    /// remaining time via `make_delay` and advances `next_at` when that
    /// delay actually fires. Dropping (or losing a select with) the pending
    /// branch leaves `next_at` untouched, so the next `arm` call re-measures
    /// the same deadline rather than skipping it.
    pub fn arm<'a, D, F>(&'a self, make_delay: F) -> Arm<'a, ()>
    where
        F: FnOnce(Duration) -> D,
        D: Future<Output = ()> + Send + 'a,
    {
        let now = Instant::now();
        let mut next = self.next_at.lock().unwrap();
        if now >= *next {
            *next += self.period;
            return Arm::Immediate(());
        }
        let remaining = *next - now;
        drop(next);
        let delay = make_delay(remaining);
        let period = self.period;
        let next_at = &self.next_at;
        let fut: std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> = Box::pin(async move {
            delay.await;
            *next_at.lock().unwrap() += period;
        });
        Arm::Pending(fut, Box::new(|| {}))
    }
}
