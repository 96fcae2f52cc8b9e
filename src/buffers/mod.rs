//! Concrete `ChannelBuffer` implementations, one module per flavor from the
//! buffer flavor table. [`vyukov`] is the shared lock-free engine underneath
//! both [`bounded`] and [`srsw`]; [`broadcast`] stands apart from the
//! `ChannelBuffer` trait entirely, since a broadcast pop is parameterized by
//! a per-subscriber cursor rather than shared queue state.

pub(crate) mod bounded;
pub(crate) mod broadcast;
pub(crate) mod chunked;
pub(crate) mod latest;
pub(crate) mod mpmc;
pub(crate) mod promise;
pub(crate) mod rendezvous;
pub(crate) mod srsw;
pub(crate) mod unbounded;
pub(crate) mod vyukov;
