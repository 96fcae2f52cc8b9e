//! Credit-based flow control: used whenever the receiving side's buffer has
//! a bounded capacity, so that an unbounded backlog can never build up on
//! one side of a remote connection.
//!
//! [`FlowControlledSender`] holds the sender-side half of the state model
//! (`credits`, `creditWaiter`); [`FlowControlledReceiver`] holds the
//! receiver-side half (`consumedSinceAck`, `creditBatchSize`, `creditPort`,
//! `pendingAcks`). They are two cooperating types rather than one combined
//! struct because in this crate a connection's two ends are always owned by
//! two different tasks (often two different contexts entirely) — bundling
//! both roles' state into a single type would force whichever side isn't
//! using a given field to carry it anyway.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_event::Event;

use crate::buffer::ChannelBuffer;
use crate::buffers::unbounded::UnboundedFifo;
use crate::result::{TryRecvError, TrySendError};

use super::connection::RemoteError;
use super::control::{ControlMessage, PlatformPort, PlatformReceiver, PortMessage};

/// The sending half of a flow-controlled connection.
///
/// `send` awaits a credit if none is currently available; `try_send` fails
/// immediately instead of queueing, matching the base `trySend` contract
/// that a flow-controlled transport must not silently buffer past the
/// credit budget on the sender's own side.
pub struct FlowControlledSender<T> {
    port: Arc<dyn PlatformPort<T>>,
    credits: AtomicU64,
    credit_waiter: Event,
    closed: AtomicBool,
}

impl<T: Send + 'static> FlowControlledSender<T> {
    /// `initial_credits` comes from the handshake's `ConnectRecvRequest`.
    pub fn new(port: Arc<dyn PlatformPort<T>>, initial_credits: u64) -> Self {
        Self {
            port,
            credits: AtomicU64::new(initial_credits),
            credit_waiter: Event::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn try_consume_credit(&self) -> bool {
        let mut current = self.credits.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.credits.compare_exchange_weak(
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

    /// Sends `value`, waiting for a credit to become available if none is
    /// on hand. Partial credits are never refunded: once consumed, a credit
    /// is gone whether or not the peer ever acknowledges the value.
    ///
    /// Uses [`Event::wait_until`] rather than a separate check-then-wait,
    /// the same atomic check+register primitive [`crate::ops::send_bounded`]
    /// builds on: a `receive_credit` landing between the fast-path check and
    /// registration would otherwise wake nobody and leave this send parked
    /// forever.
    pub async fn send(&self, value: T) -> Result<(), RemoteError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RemoteError::Disconnected(value));
        }
        if self.try_consume_credit() {
            self.port.send(PortMessage::Value(value));
            return Ok(());
        }
        let mut disconnected = false;
        self.credit_waiter
            .wait_until(|| {
                if self.closed.load(Ordering::Acquire) {
                    disconnected = true;
                    return Some(());
                }
                if self.try_consume_credit() {
                    return Some(());
                }
                None
            })
            .await;
        if disconnected {
            return Err(RemoteError::Disconnected(value));
        }
        self.port.send(PortMessage::Value(value));
        Ok(())
    }

    /// Sends `value` only if a credit is immediately available: fails with
    /// `Full` rather than queueing past the credit budget, or
    /// `Disconnected` if the connection is already closed.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Disconnected(value));
        }
        if self.try_consume_credit() {
            self.port.send(PortMessage::Value(value));
            return Ok(());
        }
        Err(TrySendError::Full(value))
    }

    /// Called when a `FlowCredit` control message arrives from the
    /// receiver.
    pub fn receive_credit(&self, credits: u64) {
        if credits == 0 {
            return;
        }
        self.credits.fetch_add(credits, Ordering::AcqRel);
        self.credit_waiter.notify(usize::MAX);
    }

    /// Tears the connection down: tells the peer, unblocks any pending
    /// `send`, and fails future sends with `Disconnected`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.port.send(PortMessage::Control(ControlMessage::Disconnect));
            self.credit_waiter.notify(usize::MAX);
        }
    }

    /// Returns `true` once [`Self::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current credit count, mostly useful for tests and diagnostics.
    pub fn credits(&self) -> u64 {
        self.credits.load(Ordering::Acquire)
    }
}

/// The receiving half of a flow-controlled connection: a locally bounded
/// buffer plus the bookkeeping needed to ack consumed capacity back.
pub struct FlowControlledReceiver<T> {
    buf: UnboundedFifo<T>,
    closed: AtomicBool,
    consumed_since_ack: AtomicU64,
    credit_batch_size: u64,
    credit_port: Mutex<Option<Arc<dyn PlatformPort<T>>>>,
    pending_acks: AtomicU64,
}

impl<T: Send + 'static> FlowControlledReceiver<T> {
    /// `capacity` seeds the handshake's `initial_credits`; `credit_batch_size`
    /// is typically `capacity / 2`.
    pub fn new(credit_batch_size: u64) -> Self {
        Self {
            buf: UnboundedFifo::new(),
            closed: AtomicBool::new(false),
            consumed_since_ack: AtomicU64::new(0),
            credit_batch_size,
            credit_port: Mutex::new(None),
            pending_acks: AtomicU64::new(0),
        }
    }

    /// Learns the port to send `FlowCredit` acks on — from a
    /// `ConnectSenderRequest`'s `reply_port`, or passed directly when both
    /// roles are wired up by the same caller. Flushes any ack accumulated
    /// while the port was still unknown.
    pub fn set_credit_port(&self, port: Arc<dyn PlatformPort<T>>) {
        let pending = self.pending_acks.swap(0, Ordering::AcqRel);
        if pending > 0 {
            port.send(PortMessage::Control(ControlMessage::FlowCredit { credits: pending }));
        }
        *self.credit_port.lock().unwrap() = Some(port);
    }

    pub(crate) fn push(&self, value: T) {
        let _ = self.buf.try_push(value);
    }

    fn ack(&self, n: u64) {
        if n == 0 {
            return;
        }
        let consumed = self.consumed_since_ack.fetch_add(n, Ordering::AcqRel) + n;
        if consumed < self.credit_batch_size {
            return;
        }
        self.consumed_since_ack.fetch_sub(consumed, Ordering::AcqRel);
        let port = self.credit_port.lock().unwrap();
        match port.as_ref() {
            Some(port) => port.send(PortMessage::Control(ControlMessage::FlowCredit { credits: consumed })),
            None => {
                self.pending_acks.fetch_add(consumed, Ordering::AcqRel);
            }
        }
    }

    /// Receives a value without blocking, acking consumed capacity back to
    /// the sender once `credit_batch_size` items have drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.buf.try_pop() {
            Some(v) => {
                self.ack(1);
                Ok(v)
            }
            None if self.closed.load(Ordering::Acquire) => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Current pending-ack count accumulated while the credit port was
    /// unknown; mostly useful for tests.
    pub fn pending_acks(&self) -> u64 {
        self.pending_acks.load(Ordering::Acquire)
    }
}

/// Drives incoming `reply` traffic into `receiver`'s local buffer and, once
/// the sender's reply port becomes known (from `ConnectSenderRequest`),
/// wires it up as the credit-ack destination.
pub async fn drive<T: Send + 'static>(
    mut reply: impl PlatformReceiver<T>,
    receiver: Arc<FlowControlledReceiver<T>>,
) {
    loop {
        let next = std::future::poll_fn(|cx| reply.poll_message(cx)).await;
        match next {
            Some(PortMessage::Value(v)) => receiver.push(v),
            Some(PortMessage::Batch(values)) => {
                for v in values {
                    receiver.push(v);
                }
            }
            Some(PortMessage::Control(ControlMessage::ConnectSenderRequest { reply_port })) => {
                receiver.set_credit_port(reply_port);
            }
            Some(PortMessage::Control(ControlMessage::Disconnect)) | None => {
                receiver.closed.store(true, Ordering::Release);
                reply.close();
                return;
            }
            Some(PortMessage::Control(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;
    use std::collections::VecDeque;
    use std::task::Context;

    struct TestPort<T> {
        inbox: Arc<Mutex<VecDeque<PortMessage<T>>>>,
    }

    impl<T: Send> PlatformPort<T> for TestPort<T> {
        fn send(&self, message: PortMessage<T>) {
            self.inbox.lock().unwrap().push_back(message);
        }
    }

    fn drain_credits(inbox: &Mutex<VecDeque<PortMessage<u8>>>) -> Vec<u64> {
        let mut inbox = inbox.lock().unwrap();
        let mut credits = Vec::new();
        inbox.retain(|m| {
            if let PortMessage::Control(ControlMessage::FlowCredit { credits: c }) = m {
                credits.push(*c);
                false
            } else {
                true
            }
        });
        credits
    }

    #[test]
    fn sender_blocks_once_credits_are_exhausted_and_resumes_on_flow_credit() {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let port: Arc<dyn PlatformPort<u8>> = Arc::new(TestPort { inbox: inbox.clone() });
        let sender = FlowControlledSender::new(port, 2);

        assert!(sender.try_send(1).is_ok());
        assert!(sender.try_send(2).is_ok());
        assert!(matches!(sender.try_send(3), Err(TrySendError::Full(3))));
        assert_eq!(sender.credits(), 0);

        sender.receive_credit(2);
        assert_eq!(sender.credits(), 2);
        assert!(sender.try_send(3).is_ok());
        assert!(sender.try_send(4).is_ok());

        let _ = inbox;
    }

    #[test]
    fn receiver_acks_once_the_batch_size_is_reached() {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let credit_port: Arc<dyn PlatformPort<u8>> = Arc::new(TestPort { inbox: inbox.clone() });
        let receiver = FlowControlledReceiver::new(2);
        receiver.set_credit_port(credit_port);

        receiver.push(1);
        receiver.push(2);
        receiver.push(3);

        assert_eq!(receiver.try_recv(), Ok(1));
        assert!(drain_credits(&inbox).is_empty());
        assert_eq!(receiver.try_recv(), Ok(2));
        assert_eq!(drain_credits(&inbox), vec![2]);
        assert_eq!(receiver.try_recv(), Ok(3));
    }

    #[test]
    fn pending_acks_accumulate_until_the_credit_port_is_known() {
        let receiver = FlowControlledReceiver::<u8>::new(1);
        receiver.push(1);
        assert_eq!(receiver.try_recv(), Ok(1));
        assert_eq!(receiver.pending_acks(), 1);

        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let credit_port: Arc<dyn PlatformPort<u8>> = Arc::new(TestPort { inbox: inbox.clone() });
        receiver.set_credit_port(credit_port);
        assert_eq!(drain_credits(&inbox), vec![1]);
        assert_eq!(receiver.pending_acks(), 0);
    }

    #[test]
    fn closing_the_sender_unblocks_a_pending_send() {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let port: Arc<dyn PlatformPort<u8>> = Arc::new(TestPort { inbox });
        let sender = Arc::new(FlowControlledSender::new(port, 0));

        let sender2 = sender.clone();
        let waker = futures_task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let fut = sender2.send(1);
        futures_util::pin_mut!(fut);
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        sender.close();
        assert!(matches!(
            block_on(async { fut.await }),
            Err(RemoteError::Disconnected(1))
        ));
    }

    // Drives a real concurrent interleaving rather than polling by hand: a
    // blocked `send` must observe a `receive_credit` that lands anywhere
    // between its fast-path check and the predicate actually registering,
    // not just one that arrives safely after registration.
    #[test]
    fn a_concurrently_arriving_credit_always_unblocks_the_sender() {
        use std::thread;

        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let port: Arc<dyn PlatformPort<u8>> = Arc::new(TestPort { inbox });

        for _ in 0..200 {
            let sender = Arc::new(FlowControlledSender::new(port.clone(), 0));
            let sender2 = sender.clone();

            let th_send = thread::spawn(move || block_on(sender2.send(1)));
            sender.receive_credit(1);

            assert!(th_send.join().unwrap().is_ok());
        }
    }
}
