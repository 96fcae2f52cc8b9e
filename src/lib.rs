//! A family of typed message-passing channels — single- and
//! multi-producer/consumer FIFOs, a broadcast ring, one-shot promises — plus
//! a fair async selection engine, a `Notify` signal, and (behind the
//! `remote` feature) a credit-controlled transport for moving channel
//! traffic across a process boundary.
//!
//! # Flavors
//!
//! Each flavor lives in its own module under [`handles`] and is built from
//! its own `channel`/`unbounded`/`Builder` constructor, rather than funneling
//! every shape through one generic type:
//!
//! - [`handles::spsc`] — single-producer, single-consumer, bounded ring.
//! - [`handles::mpsc`] — multi-producer, single-consumer; bounded,
//!   rendezvous, unbounded, chunked or latest-only storage via
//!   [`handles::mpsc::Builder`].
//! - [`handles::mpmc`] — multi-producer, multi-consumer; bounded, unbounded
//!   or chunked storage via [`handles::mpmc::Builder`]. Cloned receivers
//!   share one queue rather than fanning out.
//! - [`handles::broadcast`] — single-producer, multi-consumer; every
//!   subscriber sees every value, or observes a lag, via a fixed-capacity
//!   ring.
//! - [`handles::oneshot`] — a single value, set at most once.
//!
//! # Disconnection
//!
//! All flavors share the disconnection protocol described in the crate's
//! internal `lifecycle` module: a channel is send-disconnected once every
//! sender is closed, or every receiver is closed with none active; it is
//! recv-disconnected once every receiver is closed, or every sender is
//! closed and the buffer has drained. Disconnection is always reported
//! through the `Result` of the operation that observes it.
//!
//! # Selection and signaling
//!
//! [`select::SelectBuilder`] composes receive, send, timer and arbitrary
//! future branches into one fairly-rotated `await`. [`notify::Notify`] is a
//! standalone wake-one/wake-all signal independent of any channel.
//! [`ticker::Ticker`] produces periodic selection branches with no
//! catch-up for missed ticks. [`throttle`] wraps any sender with a
//! rate-limited or debounced submit path.
//!
//! # Remote transport
//!
//! With the `remote` feature enabled, [`remote::RemoteConnection`] and
//! [`remote::FlowControlledRemoteConnection`] carry channel traffic across
//! an opaque [`remote::PlatformPort`], including transferred-handle payloads
//! and, for the flow-controlled variant, a credit protocol that keeps an
//! unbounded number of in-flight messages from piling up on one side.

#![warn(missing_docs)]

pub(crate) mod buffer;
pub(crate) mod buffers;
pub(crate) mod core;
pub(crate) mod lifecycle;
pub(crate) mod loom_exports;
pub(crate) mod ops;
pub(crate) mod registry;
pub(crate) mod waiter;

pub mod handles;
pub mod notify;
pub mod policy;
pub mod result;
pub mod select;
pub mod throttle;
pub mod ticker;

#[cfg(feature = "remote")]
pub mod remote;

pub use ops::RecvCancelable;
pub use policy::DropPolicy;
pub use result::{
    CanceledError, RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError,
};
