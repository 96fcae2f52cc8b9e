//! Typed `Sender`/`Receiver` pairs, one module per channel flavor. Every
//! flavor except broadcast wraps [`generic::Sender`]/[`generic::Receiver`]
//! (the shared implementation for any `BoundedBuffer`-backed core) in its
//! own named types, so that `Clone` and multi-subscription are only offered
//! where the flavor actually supports them.

pub(crate) mod generic;

pub mod broadcast;
pub mod mpmc;
pub mod mpsc;
pub mod oneshot;
pub mod spsc;
