//! The wire protocol laid over an opaque [`PlatformPort`]: a sum type of
//! control messages plus the two shapes of payload they accompany.
//!
//! A concrete `PlatformPort` that actually crosses a serialization boundary
//! (worker messaging, IPC) is an external collaborator this crate does not
//! own; what's here is the typed contract such an adapter must preserve.
//! An adapter serializing this onto a schemaless transport tags every
//! control message with a `"#cc"` discriminator field holding one of
//! `"ConnectRecvRequest"`, `"ConnectSenderRequest"`, `"ConnectOk"`,
//! `"Disconnect"`, `"FlowCredit"`, `"BatchMessage"`, so that a value on the
//! wire can be told apart from a message about the connection itself; an
//! unrecognized discriminator decodes to a data value rather than a panic.

use std::sync::Arc;

/// A sending endpoint reachable across a context boundary.
///
/// Cloning a port (via `Arc`) and handing it out as a `reply_port` is how
/// the other side learns where to send its own traffic back — there is no
/// separate registry lookup across contexts, only the port itself.
pub trait PlatformPort<T>: Send + Sync {
    /// Enqueues a message. No acknowledgment and no failure signal beyond
    /// the port having been closed; callers learn about a dead port only
    /// indirectly, by the absence of a `ConnectOk`/`FlowCredit` reply.
    fn send(&self, message: PortMessage<T>);
}

impl<T, P: PlatformPort<T> + ?Sized> PlatformPort<T> for Arc<P> {
    fn send(&self, message: PortMessage<T>) {
        (**self).send(message);
    }
}

/// The receiving half created locally to accept a remote peer's traffic.
pub trait PlatformReceiver<T>: Send {
    /// The port to hand the remote peer as a `reply_port` so it knows where
    /// to send values (and, for the flow-controlled variant, credits) back.
    fn reply_port(&self) -> Arc<dyn PlatformPort<T>>;

    /// Polls for the next incoming message, or `None` once the underlying
    /// transport has closed with no further messages pending.
    fn poll_message(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<PortMessage<T>>>;

    /// Releases any transport-side resources. Idempotent.
    fn close(&mut self);
}

/// Everything that can travel across a `PlatformPort`.
pub enum PortMessage<T> {
    /// A single channel value.
    Value(T),
    /// Several channel values coalesced into one transmission.
    Batch(Vec<T>),
    /// A message about the connection itself rather than channel data.
    Control(ControlMessage<T>),
}

/// The control-message sum type.
pub enum ControlMessage<T> {
    /// Sent by a receiver opening a fire-and-forget or flow-controlled
    /// connection: `reply_port` is where the sender should address values
    /// (and credits) back, `initial_credits` seeds the flow-controlled
    /// sender's budget (`0` for the fire-and-forget variant).
    ConnectRecvRequest {
        reply_port: Arc<dyn PlatformPort<T>>,
        initial_credits: u64,
    },
    /// Sent by a sender announcing itself to a receiver it wants to push
    /// into, so the receiver learns where to send `FlowCredit` acks.
    ConnectSenderRequest { reply_port: Arc<dyn PlatformPort<T>> },
    /// Acknowledges a `ConnectRecvRequest`/`ConnectSenderRequest`.
    ConnectOk,
    /// Either side is tearing the connection down.
    Disconnect,
    /// Grants the sender `credits` more transmissions.
    FlowCredit { credits: u64 },
}
