//! Credit-controlled transport for moving channel traffic across a context
//! boundary, layered over an opaque [`PlatformPort`]/[`PlatformReceiver`]
//! pair this crate does not implement itself — only the protocol riding on
//! top of them.
//!
//! [`RemoteSender`]/[`RemoteReceiver`] (in [`connection`]) are the base
//! fire-and-forget variant: no backpressure, an unbounded local buffer on
//! the receiving side. [`FlowControlledSender`]/[`FlowControlledReceiver`]
//! (in [`flow_controlled`]) add the credit protocol used whenever the
//! receiving side's buffer has a bounded capacity, so an unbounded backlog
//! of in-flight messages can never build up. [`control`] defines the wire
//! protocol both variants speak. [`transfer::TransferPayload`] is the
//! packed shape a handle collapses to when it crosses the same boundary,
//! reconstructed on the other side with no local registry standing at all.
//!
//! `tracing` spans at `debug`/`trace` cover the control-message traffic
//! (handshakes, credit grants, disconnects) since this is the one place in
//! the crate where a silently lost message — a dropped `FlowCredit`, a
//! handshake that never arrives — can wedge a connection with no local
//! symptom to debug from.

pub mod connection;
pub mod control;
pub mod flow_controlled;
pub mod transfer;

pub use connection::{connect_receiver, drive as drive_connection, RemoteError, RemoteReceiver, RemoteSender};
pub use control::{ControlMessage, PlatformPort, PlatformReceiver, PortMessage};
pub use flow_controlled::{drive as drive_flow_controlled, FlowControlledReceiver, FlowControlledSender};
pub use transfer::{AlreadyConsumed, TransferPayload};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TrySendError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // A loopback `PlatformPort` that just appends to an in-memory queue;
    // enough to drive the credit protocol end to end without a real
    // transport.
    struct LoopbackPort<T> {
        inbox: Mutex<VecDeque<PortMessage<T>>>,
    }

    impl<T: Send> PlatformPort<T> for LoopbackPort<T> {
        fn send(&self, message: PortMessage<T>) {
            self.inbox.lock().unwrap().push_back(message);
        }
    }

    impl<T> LoopbackPort<T> {
        fn new() -> Arc<Self> {
            Arc::new(Self { inbox: Mutex::new(VecDeque::new()) })
        }

        fn take_credit(&self) -> Option<u64> {
            let mut inbox = self.inbox.lock().unwrap();
            let mut found = None;
            inbox.retain(|m| {
                if let PortMessage::Control(ControlMessage::FlowCredit { credits }) = m {
                    found = Some(*credits);
                    false
                } else {
                    true
                }
            });
            found
        }

        fn drain_values(&self) -> Vec<T> {
            let mut inbox = self.inbox.lock().unwrap();
            let mut values = Vec::new();
            while let Some(PortMessage::Value(v)) = inbox.pop_front() {
                values.push(v);
            }
            values
        }
    }

    // Scenario S8: capacity=32, creditBatchSize=16; a remote sender attempts
    // 64 sends; after 32 it blocks; the receiver drains 16 items; one
    // `FlowCredit(16)` is transmitted; the sender resumes for 16 more, then
    // blocks again until further credits.
    #[test]
    fn flow_controlled_remote_respects_the_credit_budget() {
        const CAPACITY: u64 = 32;
        const CREDIT_BATCH: u64 = 16;

        let values_port = LoopbackPort::<u32>::new();
        let credit_port = LoopbackPort::<u32>::new();

        let sender = FlowControlledSender::new(values_port.clone(), CAPACITY);
        let receiver = FlowControlledReceiver::new(CREDIT_BATCH);
        receiver.set_credit_port(credit_port.clone());

        // First 32 sends consume the whole initial budget; the 33rd fails
        // fast rather than queueing.
        for i in 0..CAPACITY {
            sender.try_send(i as u32).unwrap();
        }
        assert_eq!(sender.credits(), 0);
        assert!(matches!(sender.try_send(999), Err(TrySendError::Full(999))));

        // Feed everything the sender actually transmitted into the
        // receiver's local buffer, as `connection::drive`'s loop body
        // would.
        for v in values_port.drain_values() {
            receiver.push(v);
        }

        // Draining exactly `creditBatchSize` items triggers one ack.
        for _ in 0..CREDIT_BATCH {
            receiver.try_recv().unwrap();
        }
        assert_eq!(credit_port.take_credit(), Some(CREDIT_BATCH));

        // The sender resumes once the credit arrives, for exactly the
        // granted amount, then blocks again.
        sender.receive_credit(CREDIT_BATCH);
        assert_eq!(sender.credits(), CREDIT_BATCH);
        for i in 0..CREDIT_BATCH {
            sender.try_send(1000 + i as u32).unwrap();
        }
        assert_eq!(sender.credits(), 0);
        assert!(matches!(sender.try_send(2000), Err(TrySendError::Full(2000))));
    }

    // Property 10: the number of in-flight (sent-but-not-acked) messages
    // never exceeds `initialCredits + sum(FlowCredit) - sum(acknowledged)`.
    #[test]
    fn in_flight_count_never_exceeds_the_credit_budget() {
        const CAPACITY: u64 = 8;
        const CREDIT_BATCH: u64 = 4;

        let values_port = LoopbackPort::<u32>::new();
        let credit_port = LoopbackPort::<u32>::new();

        let sender = FlowControlledSender::new(values_port.clone(), CAPACITY);
        let receiver = FlowControlledReceiver::new(CREDIT_BATCH);
        receiver.set_credit_port(credit_port.clone());

        let mut granted = CAPACITY;
        let mut acknowledged = 0u64;
        let mut in_flight = 0u64;

        for i in 0..40u32 {
            if sender.try_send(i).is_ok() {
                in_flight += 1;
                assert!(in_flight <= granted - acknowledged);
            }
            for v in values_port.drain_values() {
                receiver.push(v);
            }
            if receiver.try_recv().is_ok() {
                in_flight -= 1;
            }
            if let Some(credits) = credit_port.take_credit() {
                acknowledged += credits;
                sender.receive_credit(credits);
                granted += credits;
            }
        }
    }
}
