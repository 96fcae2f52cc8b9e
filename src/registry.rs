//! Process-local registry of live channel cores, keyed by a small integer
//! id with free-slot recycling.
//!
//! A handle normally holds its `Arc<ChannelCore<T, B>>` directly — the local
//! fast path. The registry exists for the one case that direct ownership
//! can't cover: a handle payload that has crossed a context boundary (a
//! transferable handle sent down a remote connection) carries only the
//! `channel_id` integer, not a pointer, and must either look up a live
//! local core (if the boundary was in fact within the same process/context)
//! or fall back to the remote path entirely (`channel_id == NO_LOCAL_ID`).
//!
//! Types are erased behind `Any` since the registry is shared by every
//! channel flavor regardless of its buffer type; `lookup` downcasts back to
//! the caller's statically known `T`/`B`, which is always known at the call
//! site since the call site is generated per-flavor.

use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock};

/// Sentinel id meaning "no local fast path; route via the remote
/// transport". Mirrors the wire protocol's `id = -1` convention, expressed
/// as the maximum `usize` since ids here are unsigned array indices.
pub const NO_LOCAL_ID: usize = usize::MAX;

struct RegistryInner {
    slots: Vec<Option<Arc<dyn Any + Send + Sync>>>,
    free: Vec<usize>,
}

struct Registry {
    inner: Mutex<RegistryInner>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        inner: Mutex::new(RegistryInner {
            slots: Vec::new(),
            free: Vec::new(),
        }),
    })
}

/// Reserves a fresh slot (initially empty) and returns its id. Used so a
/// core can learn its own id before the `Arc` that will fill the slot
/// exists, rather than back-patching an already-shared `Arc`.
pub(crate) fn reserve() -> usize {
    let mut inner = registry().inner.lock().unwrap();
    if let Some(slot) = inner.free.pop() {
        slot
    } else {
        inner.slots.push(None);
        inner.slots.len() - 1
    }
}

/// Fills a slot previously returned by [`reserve`].
pub(crate) fn fill<C: Any + Send + Sync>(id: usize, core: Arc<C>) {
    let mut inner = registry().inner.lock().unwrap();
    inner.slots[id] = Some(core);
}

/// Looks up a previously registered core by id, downcasting to `C`.
///
/// Returns `None` if `id == NO_LOCAL_ID`, the slot was freed, or the
/// concrete type at that slot doesn't match `C` (which would indicate a
/// stale id reused by an unrelated flavor — treated as "no local fast path"
/// rather than a panic).
pub(crate) fn lookup<C: Any + Send + Sync>(id: usize) -> Option<Arc<C>> {
    if id == NO_LOCAL_ID {
        return None;
    }
    let inner = registry().inner.lock().unwrap();
    inner.slots.get(id)?.as_ref()?.clone().downcast::<C>().ok()
}

/// Frees a slot so it can be recycled by a future registration. Idempotent.
pub(crate) fn unregister(id: usize) {
    if id == NO_LOCAL_ID {
        return;
    }
    let mut inner = registry().inner.lock().unwrap();
    if let Some(slot) = inner.slots.get_mut(id) {
        if slot.take().is_some() {
            inner.free.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_unregister_recycles_slot() {
        let id = reserve();
        fill(id, Arc::new(7u32));
        assert_eq!(*lookup::<u32>(id).unwrap(), 7);
        unregister(id);
        assert!(lookup::<u32>(id).is_none());

        let id2 = reserve();
        fill(id2, Arc::new(String::from("x")));
        assert_eq!(*lookup::<String>(id2).unwrap(), "x");
        unregister(id2);
    }

    #[test]
    fn mismatched_type_lookup_returns_none() {
        let id = reserve();
        fill(id, Arc::new(7u32));
        assert!(lookup::<String>(id).is_none());
        unregister(id);
    }
}
