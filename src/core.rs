//! `ChannelCore`: the struct every flavor's handles share ownership of via
//! `Arc`, composing a buffer, a lifecycle record, an optional metrics tag,
//! and a registry slot.

use std::sync::Arc;

use crate::buffer::ChannelBuffer;
use crate::lifecycle::Lifecycle;
use crate::registry;

/// Shared state for one channel instance.
///
/// `B` is the concrete buffer type (one of the eight flavors in
/// `crate::buffers`); it is always known statically at the handle's
/// construction site, so `ChannelCore` is generic over it rather than
/// boxing a `dyn ChannelBuffer` — this keeps the hot `try_push`/`try_pop`
/// paths monomorphized and inlinable.
pub(crate) struct ChannelCore<T, B: ChannelBuffer<T>> {
    /// This core's slot in the process-local registry.
    pub(crate) id: usize,
    pub(crate) buf: B,
    pub(crate) lifecycle: Lifecycle,
    /// Tag surfaced to a `MetricsRecorder` implementation; the recorder
    /// itself is an external collaborator this crate does not own, so this
    /// crate only carries the tag.
    pub(crate) metrics_id: Option<Arc<str>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + 'static, B: ChannelBuffer<T> + 'static> ChannelCore<T, B> {
    pub(crate) fn new(
        buf: B,
        senders: usize,
        receivers: usize,
        metrics_id: Option<Arc<str>>,
    ) -> Arc<Self> {
        // The id is reserved before the core exists so it can be stored as
        // a plain, never-mutated field instead of patched in after the
        // fact.
        let id = registry::reserve();
        let core = Arc::new(Self {
            id,
            buf,
            lifecycle: Lifecycle::new(senders, receivers),
            metrics_id,
            _marker: std::marker::PhantomData,
        });
        registry::fill(id, core.clone());
        core
    }

    /// Closes the sending side. If this was the last sender, propagates
    /// closure per the disconnection protocol: mark closed, wake all
    /// push-waiters, and — if the buffer is now empty — fail all
    /// pop-waiters too.
    pub(crate) fn close_sender_side(&self) {
        self.lifecycle.mark_closed_senders();
        self.buf.wake_all_push_waiters();
        if self.buf.len_hint() == 0 {
            self.buf.fail_all_pop_waiters();
        }
    }

    /// Called when the last live `Sender` handle is dropped/closed.
    pub(crate) fn release_sender(&self) {
        if self.lifecycle.release_sender() {
            self.close_sender_side();
        }
    }

    /// Closes the receiving side. Order matters: push-waiters are woken
    /// *before* the buffer is cleared, so a sender racing on `wait_not_full`
    /// then retrying `try_push` is guaranteed to observe the disconnected
    /// state rather than momentarily-freed space.
    pub(crate) fn close_receiver_side(&self) {
        self.lifecycle.mark_closed_receivers();
        self.buf.wake_all_push_waiters();
        self.buf.fail_all_pop_waiters();
        self.buf.clear();
    }

    pub(crate) fn release_receiver(&self) {
        if self.lifecycle.release_receiver() {
            self.close_receiver_side();
        }
    }
}

impl<T, B: ChannelBuffer<T>> Drop for ChannelCore<T, B> {
    fn drop(&mut self) {
        registry::unregister(self.id);
    }
}
