//! Broadcast ring: fixed power-of-two capacity, a single monotonic write
//! sequence, and one independent read cursor per subscriber. Does not
//! implement [`crate::buffer::ChannelBuffer`] directly — unlike every other
//! flavor, a pop here is parameterized by which subscriber is asking, so the
//! SPMC handle pair (`crate::handles::broadcast`) drives this type through
//! its own small API instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::waiter::{MultiWaiterQueue, PopWaiter, WaiterOutcome};

/// Outcome of a single subscriber's receive attempt.
pub(crate) enum BroadcastPop<T> {
    Value(T),
    Empty,
    Disconnected,
}

struct Slot<T> {
    seq: u64,
    value: Arc<T>,
}

pub(crate) struct BroadcastRing<T> {
    cap: u64,
    mask: u64,
    slots: Box<[Mutex<Option<Slot<T>>>]>,
    write_seq: AtomicU64,
    closed: AtomicBool,
    waiters: Arc<MultiWaiterQueue<()>>,
}

impl<T: Clone> BroadcastRing<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity.is_power_of_two(), "capacity must be a positive power of two");
        let slots = (0..capacity).map(|_| Mutex::new(None)).collect();
        Self {
            cap: capacity as u64,
            mask: capacity as u64 - 1,
            slots,
            write_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            waiters: Arc::new(MultiWaiterQueue::new()),
        }
    }

    /// The cursor a newly attached subscriber should start at. `replay`
    /// requests up to that many already-published items be redelivered;
    /// clamped to the ring's retention window (at most `capacity` items
    /// back from the current write position).
    pub(crate) fn initial_cursor(&self, replay: u64) -> u64 {
        let write_seq = self.write_seq.load(Ordering::Acquire);
        let floor = write_seq.saturating_sub(self.cap);
        write_seq.saturating_sub(replay).max(floor)
    }

    pub(crate) fn cursor_at_head(&self) -> u64 {
        self.write_seq.load(Ordering::Acquire)
    }

    pub(crate) fn push(&self, value: T) {
        let seq = self.write_seq.fetch_add(1, Ordering::AcqRel);
        let idx = (seq & self.mask) as usize;
        *self.slots[idx].lock().unwrap() = Some(Slot {
            seq,
            value: Arc::new(value),
        });
        self.waiters.wake_all(());
    }

    /// Attempts to advance `cursor` and return the next value. Lag (the
    /// cursor having fallen behind the retention window) is recovered by
    /// jumping the cursor forward rather than reported as an error.
    pub(crate) fn try_receive(&self, cursor: &mut u64) -> BroadcastPop<T> {
        loop {
            let write_seq = self.write_seq.load(Ordering::Acquire);
            let floor = write_seq.saturating_sub(self.cap);
            if *cursor < floor {
                *cursor = floor;
            }
            if *cursor >= write_seq {
                return if self.closed.load(Ordering::Acquire) {
                    BroadcastPop::Disconnected
                } else {
                    BroadcastPop::Empty
                };
            }
            let idx = (*cursor & self.mask) as usize;
            let guard = self.slots[idx].lock().unwrap();
            match &*guard {
                Some(slot) if slot.seq == *cursor => {
                    let value = (*slot.value).clone();
                    drop(guard);
                    *cursor += 1;
                    return BroadcastPop::Value(value);
                }
                _ => {
                    // The slot was overwritten between our `write_seq`
                    // snapshot and taking the lock; recompute the floor and
                    // retry rather than surfacing a transient inconsistency.
                    drop(guard);
                    continue;
                }
            }
        }
    }

    pub(crate) fn add_waiter(&self) -> PopWaiter<()> {
        let cell = self.waiters.add();
        PopWaiter::Multi(cell, self.waiters.clone())
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.waiters.fail_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_subscriber_reads_every_published_value() {
        let ring = BroadcastRing::new(4);
        ring.push(1);
        ring.push(2);
        let mut a = ring.initial_cursor(0);
        let mut b = ring.initial_cursor(0);
        for cursor in [&mut a, &mut b] {
            match ring.try_receive(cursor) {
                BroadcastPop::Value(v) => assert_eq!(v, 1),
                _ => panic!("expected first value"),
            }
            match ring.try_receive(cursor) {
                BroadcastPop::Value(v) => assert_eq!(v, 2),
                _ => panic!("expected second value"),
            }
            assert!(matches!(ring.try_receive(cursor), BroadcastPop::Empty));
        }
    }

    #[test]
    fn lagging_cursor_jumps_to_retention_floor() {
        let ring = BroadcastRing::new(2);
        let mut cursor = 0;
        for i in 0..5 {
            ring.push(i);
        }
        // Capacity 2, write_seq 5: only seq 3 and 4 survive.
        match ring.try_receive(&mut cursor) {
            BroadcastPop::Value(v) => assert_eq!(v, 3),
            _ => panic!("expected the oldest still-live value"),
        }
        match ring.try_receive(&mut cursor) {
            BroadcastPop::Value(v) => assert_eq!(v, 4),
            _ => panic!("expected the newest value"),
        }
    }

    #[test]
    fn replay_request_is_clamped_to_capacity() {
        let ring = BroadcastRing::new(4);
        for i in 0..10 {
            ring.push(i);
        }
        // Requesting more replay than capacity clamps to the retention floor.
        let mut cursor = ring.initial_cursor(100);
        match ring.try_receive(&mut cursor) {
            BroadcastPop::Value(v) => assert_eq!(v, 6),
            _ => panic!("expected the oldest retained value"),
        }
    }

    #[test]
    fn closing_reports_disconnected_once_drained() {
        let ring = BroadcastRing::<i32>::new(2);
        ring.close();
        let mut cursor = 0;
        assert!(matches!(ring.try_receive(&mut cursor), BroadcastPop::Disconnected));
    }
}
