//! Reentrant form of the group lock.
//!
//! [`ReentrantGroupMutex`] lets a thread that is already inside the lock
//! enter it again, in either mode, without deadlocking against itself.
//! Each thread carries a pair of depth counters per lock instance; only
//! the outermost enter and the outermost leave touch the underlying
//! admission protocol.
//!
//! # Shared-to-Exclusive Transition
//!
//! A thread holding the lock in shared mode may request exclusive mode.
//! Its shared slot is released first, then the exclusive slot is taken;
//! when the exclusive reentry fully unwinds, the shared slot is re-entered.
//! The interval between release and re-acquire is a real window: another
//! thread's exclusive request may be served inside it, so state observed
//! under shared mode before the transition must be revalidated after.
//!
//! # Sections, Not Data
//!
//! This primitive guards code sections rather than wrapping a value.
//! Nested exclusive guards on the same thread would otherwise require two
//! live mutable borrows of the same data, which safe Rust cannot express.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::raw::RawGroupMutex;

/// Reentry depths one thread holds on one lock instance.
#[derive(Debug, Default, Clone, Copy)]
struct Depths {
    shared: usize,
    exclusive: usize,
}

impl Depths {
    fn is_clear(self) -> bool {
        self.shared == 0 && self.exclusive == 0
    }
}

thread_local! {
    /// Per-thread reentry depths, keyed by lock instance id.
    static DEPTHS: RefCell<HashMap<u64, Depths>> = RefCell::new(HashMap::new());
}

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

fn with_depths<R>(id: u64, f: impl FnOnce(&mut Depths) -> R) -> R {
    DEPTHS.with(|map| {
        let mut map = map.borrow_mut();
        let depths = map.entry(id).or_default();
        let out = f(depths);
        if depths.is_clear() {
            map.remove(&id);
        }
        out
    })
}

/// A writer-priority group lock that a holding thread may re-enter.
///
/// Reentry is tracked per thread and per mode:
///
/// - Shared reentry: every `enter_shared` past the first is a depth
///   increment; the underlying lock is touched only at depth 0↔1.
/// - Exclusive reentry: same scheme for `enter_exclusive`.
/// - Shared while exclusive: a thread already in exclusive mode treats
///   `enter_shared` as pure bookkeeping, since exclusive mode already
///   grants everything shared mode would.
/// - Exclusive while shared: the thread's shared slot is released for the
///   duration of the exclusive episode and restored afterwards.
///
/// Guards from [`shared`](Self::shared) and
/// [`exclusive`](Self::exclusive) may be dropped in any order; the depth
/// counters make each individual drop correct regardless.
#[derive(Debug)]
pub struct ReentrantGroupMutex {
    admission: RawGroupMutex,
    id: u64,
}

impl Default for ReentrantGroupMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantGroupMutex {
    /// Creates an unlocked reentrant group lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            admission: RawGroupMutex::new(),
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Enters shared mode, or deepens an existing entry.
    ///
    /// Blocks only when this is the thread's outermost entry and an
    /// exclusive episode is pending or active. A thread already in
    /// exclusive mode records the shared entry without touching the
    /// underlying lock.
    pub fn enter_shared(&self) {
        let must_acquire = with_depths(self.id, |d| {
            let first = d.shared == 0 && d.exclusive == 0;
            d.shared += 1;
            first
        });
        if must_acquire {
            self.admission.enter_shared();
        }
    }

    /// Leaves one level of shared mode.
    ///
    /// The underlying shared slot is released only when this is the
    /// thread's outermost shared leave and no exclusive reentry is active.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread holds no shared entry on this lock.
    pub fn leave_shared(&self) {
        let must_release = with_depths(self.id, |d| {
            assert!(
                d.shared > 0,
                "leave_shared on a thread with no shared entry"
            );
            d.shared -= 1;
            d.shared == 0 && d.exclusive == 0
        });
        if must_release {
            self.admission.leave_shared();
        }
    }

    /// Enters exclusive mode, or deepens an existing entry.
    ///
    /// On the outermost exclusive entry, a thread currently holding a
    /// shared slot releases it first; the slot is restored when the
    /// exclusive reentry fully unwinds. Between release and restore
    /// another thread's exclusive request may be served.
    pub fn enter_exclusive(&self) {
        let (must_acquire, drops_shared) = with_depths(self.id, |d| {
            let first = d.exclusive == 0;
            let transition = first && d.shared > 0;
            d.exclusive += 1;
            (first, transition)
        });
        if must_acquire {
            if drops_shared {
                tracing::trace!("releasing shared slot for exclusive transition");
                self.admission.leave_shared();
            }
            self.admission.enter_exclusive();
        }
    }

    /// Leaves one level of exclusive mode.
    ///
    /// On the outermost exclusive leave, the underlying exclusive slot is
    /// released; if the thread still holds shared entries from before the
    /// transition, its shared slot is re-entered.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread holds no exclusive entry on this lock.
    pub fn leave_exclusive(&self) {
        let (must_release, restores_shared) = with_depths(self.id, |d| {
            assert!(
                d.exclusive > 0,
                "leave_exclusive on a thread with no exclusive entry"
            );
            d.exclusive -= 1;
            let last = d.exclusive == 0;
            (last, last && d.shared > 0)
        });
        if must_release {
            self.admission.leave_exclusive();
            if restores_shared {
                tracing::trace!("restoring shared slot after exclusive transition");
                self.admission.enter_shared();
            }
        }
    }

    /// Enters shared mode and returns a guard that leaves on drop.
    pub fn shared(&self) -> ReentrantSharedGuard<'_> {
        self.enter_shared();
        ReentrantSharedGuard { lock: self }
    }

    /// Enters exclusive mode and returns a guard that leaves on drop.
    pub fn exclusive(&self) -> ReentrantExclusiveGuard<'_> {
        self.enter_exclusive();
        ReentrantExclusiveGuard { lock: self }
    }

    /// The calling thread's current shared reentry depth on this lock.
    #[must_use]
    pub fn shared_depth(&self) -> usize {
        with_depths(self.id, |d| d.shared)
    }

    /// The calling thread's current exclusive reentry depth on this lock.
    #[must_use]
    pub fn exclusive_depth(&self) -> usize {
        with_depths(self.id, |d| d.exclusive)
    }
}

/// RAII shared entry on a [`ReentrantGroupMutex`].
#[must_use = "guard will be immediately released if not held"]
#[derive(Debug)]
pub struct ReentrantSharedGuard<'a> {
    lock: &'a ReentrantGroupMutex,
}

impl Drop for ReentrantSharedGuard<'_> {
    fn drop(&mut self) {
        self.lock.leave_shared();
    }
}

/// RAII exclusive entry on a [`ReentrantGroupMutex`].
#[must_use = "guard will be immediately released if not held"]
#[derive(Debug)]
pub struct ReentrantExclusiveGuard<'a> {
    lock: &'a ReentrantGroupMutex,
}

impl Drop for ReentrantExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.leave_exclusive();
    }
}
