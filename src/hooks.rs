//! Ordered callback lists.
//!
//! Hooks run synchronously, in registration order, on whatever task raised the
//! signal. The list is snapshotted before invocation so a hook may register or
//! remove hooks (including itself) without deadlocking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Identifies a registered hook for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Hook<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Ordered list of `Fn(A)` callbacks.
pub struct HookList<A> {
    hooks: Mutex<Vec<(HookId, Hook<A>)>>,
    next_id: AtomicU64,
}

impl<A: Copy> HookList<A> {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a hook; it runs after every hook registered before it.
    pub fn add<F>(&self, hook: F) -> HookId
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.hooks.lock().push((id, Arc::new(hook)));
        id
    }

    /// Remove a hook. Returns false if it was not registered.
    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every hook with `arg`, in order.
    pub fn invoke(&self, arg: A) {
        let snapshot: Vec<Hook<A>> = self.hooks.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for hook in snapshot {
            hook(arg);
        }
    }
}

impl<A: Copy> Default for HookList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for HookList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookList")
            .field("len", &self.hooks.lock().len())
            .finish()
    }
}
