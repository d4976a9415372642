//! Validity tracking for observers of a deletable owner.
//!
//! [`ValidityLock`] solves a narrow lifetime problem: one party (the
//! *original* handle) owns a resource it may tear down at any moment,
//! while other parties (*derived* handles) want to check, race-free,
//! whether the resource still exists before touching it. All handles
//! share one recursive lock and one validity flag; the flag flips to
//! false exactly once, when the original handle is dropped, and only
//! under the lock. A derived holder that observes the flag true may rely
//! on it for as long as it keeps the guard, because the flip itself must
//! wait for the lock.
//!
//! The lock protects the *flag*, never the resource behind it. Touching
//! the resource still requires whatever synchronization that resource
//! demands.
//!
//! The shared state lives as long as any handle does; dropping the
//! original invalidates but does not free, and the storage goes away with
//! the last handle, original or derived.

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// One validity flag shared by an original handle and its derived copies.
///
/// Created handles are the *original* ([`ValidityLock::new`]); [`Clone`]
/// produces *derived* handles. Dropping the original flips the shared
/// flag to false, once, under the lock; derived handles observe the flip
/// through [`ValidityGuard::is_valid`] and are otherwise inert.
///
/// The lock is recursive: a thread already holding a guard may take
/// another without deadlocking, which lets validity checks nest inside
/// code paths that already hold the lock.
#[derive(Debug)]
pub struct ValidityLock {
    shared: Arc<ReentrantMutex<Cell<bool>>>,
    original: bool,
}

impl ValidityLock {
    /// Creates an original handle with a fresh, valid flag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ReentrantMutex::new(Cell::new(true))),
            original: true,
        }
    }

    /// Takes the shared lock, blocking until it is free (or reentering it
    /// on the same thread).
    pub fn lock(&self) -> ValidityGuard<'_> {
        ValidityGuard {
            flag: self.shared.lock(),
        }
    }

    /// Tries to take the shared lock without blocking.
    ///
    /// Returns `None` when another thread holds it.
    #[must_use]
    pub fn try_lock(&self) -> Option<ValidityGuard<'_>> {
        self.shared
            .try_lock()
            .map(|flag| ValidityGuard { flag })
    }

    /// Returns true for the original handle, false for derived copies.
    #[must_use]
    pub fn is_original(&self) -> bool {
        self.original
    }

    /// Number of live handles, original included, sharing this flag.
    #[must_use]
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl Default for ValidityLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ValidityLock {
    /// Creates a derived handle.
    ///
    /// The shared state is captured under the source's lock, so a clone
    /// racing the original's drop sees the source fully live or fully
    /// dead, never in between.
    fn clone(&self) -> Self {
        let _guard = self.shared.lock();
        Self {
            shared: Arc::clone(&self.shared),
            original: false,
        }
    }
}

impl Drop for ValidityLock {
    fn drop(&mut self) {
        if self.original {
            let flag = self.shared.lock();
            flag.set(false);
            tracing::debug!("original validity handle dropped; flag invalidated");
        }
    }
}

/// Holds the shared lock and exposes the validity flag.
///
/// The flag can only be read through a guard; while the guard lives, the
/// original handle's drop cannot flip it.
#[derive(Debug)]
pub struct ValidityGuard<'a> {
    flag: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl ValidityGuard<'_> {
    /// Whether the original handle was still alive when this guard was
    /// taken (and therefore still is, for the guard's lifetime).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.flag.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::thread;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn derived_sees_valid_while_original_lives() {
        init_test("derived_sees_valid_while_original_lives");
        let original = ValidityLock::new();
        let derived = original.clone();

        let valid = derived.lock().is_valid();
        crate::assert_with_log!(valid, "valid before drop", true, valid);
        crate::assert_with_log!(
            original.handles() == 2,
            "two handles share the flag",
            2usize,
            original.handles()
        );
        crate::test_complete!("derived_sees_valid_while_original_lives");
    }

    #[test]
    fn original_drop_invalidates_derived() {
        init_test("original_drop_invalidates_derived");
        let original = ValidityLock::new();
        let derived = original.clone();

        drop(original);
        let valid = derived.lock().is_valid();
        crate::assert_with_log!(!valid, "invalid after drop", false, valid);
        crate::assert_with_log!(
            derived.handles() == 1,
            "storage survives on the derived handle",
            1usize,
            derived.handles()
        );
        crate::test_complete!("original_drop_invalidates_derived");
    }

    #[test]
    fn derived_drop_never_invalidates() {
        init_test("derived_drop_never_invalidates");
        let original = ValidityLock::new();
        let derived = original.clone();
        let second = derived.clone();

        drop(derived);
        drop(second);
        let valid = original.lock().is_valid();
        crate::assert_with_log!(valid, "still valid after derived drops", true, valid);
        crate::assert_with_log!(
            original.handles() == 1,
            "only the original remains",
            1usize,
            original.handles()
        );
        crate::test_complete!("derived_drop_never_invalidates");
    }

    #[test]
    fn clone_of_derived_is_derived() {
        init_test("clone_of_derived_is_derived");
        let original = ValidityLock::new();
        let derived = original.clone();
        let grand = derived.clone();

        crate::assert_with_log!(original.is_original(), "original flagged", true, original.is_original());
        let both_derived = !derived.is_original() && !grand.is_original();
        crate::assert_with_log!(both_derived, "copies flagged derived", true, both_derived);

        drop(grand);
        drop(original);
        let valid = derived.lock().is_valid();
        crate::assert_with_log!(!valid, "only the original's drop flips", false, valid);
        crate::test_complete!("clone_of_derived_is_derived");
    }

    #[test]
    fn guard_holds_off_invalidation() {
        init_test("guard_holds_off_invalidation");
        let original = ValidityLock::new();
        let derived = original.clone();

        let guard = derived.lock();
        let valid_before = guard.is_valid();
        crate::assert_with_log!(valid_before, "valid under guard", true, valid_before);

        let dropper = thread::spawn(move || {
            // Blocks on the guard held by the main thread.
            drop(original);
        });

        // The flag cannot flip while the guard lives.
        let still_valid = guard.is_valid();
        crate::assert_with_log!(still_valid, "flip deferred by guard", true, still_valid);
        drop(guard);

        dropper.join().expect("dropper thread");
        let valid_after = derived.lock().is_valid();
        crate::assert_with_log!(!valid_after, "flip lands after release", false, valid_after);
        crate::test_complete!("guard_holds_off_invalidation");
    }

    #[test]
    fn lock_is_reentrant_on_one_thread() {
        init_test("lock_is_reentrant_on_one_thread");
        let lock = ValidityLock::new();

        let outer = lock.lock();
        let inner = lock.lock();
        let both = outer.is_valid() && inner.is_valid();
        crate::assert_with_log!(both, "nested guards coexist", true, both);
        crate::test_complete!("lock_is_reentrant_on_one_thread");
    }
}
