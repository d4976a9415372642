//! The writer-priority admission protocol.
//!
//! [`RawGroupMutex`] is the four-operation core the rest of the crate is
//! built on: any number of shared holders may be inside the lock at once,
//! while an exclusive requester gets priority — from the moment it asks,
//! no new shared entrant is admitted, the existing shared holders drain
//! naturally, and the requester proceeds once the last of them has left.
//!
//! # Admission Policy
//!
//! | Scenario                     | Behavior                                   |
//! |------------------------------|--------------------------------------------|
//! | No exclusive episode         | Shared entrants are admitted immediately   |
//! | Exclusive pending or active  | New shared entrants block                  |
//! | Shared holders + exclusive   | Exclusive waits for holders to drain       |
//! | Multiple exclusive waiters   | Served one at a time, in no promised order |
//!
//! # Wake Correctness
//!
//! The drain hand-off is the delicate part: the exclusive requester must
//! reliably wake when the shared-holder count goes from nonzero to zero. The
//! count's decrement, the waiter-count check, and the notify all happen under
//! the one internal mutex that also guards the requester's condition check,
//! so the wakeup cannot fall between check and wait.
//!
//! # Pairing Obligation
//!
//! This is a raw protocol: every `enter_*` must be matched by exactly one
//! `leave_*`, from any thread. Unbalanced calls leave the admission state
//! permanently wedged. The guarded wrappers ([`GroupMutex`]) discharge the
//! obligation through RAII and should be preferred outside lock-composition
//! code.
//!
//! [`GroupMutex`]: crate::group::GroupMutex

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct AdmissionState {
    /// Threads currently inside the lock in shared mode.
    shared_holders: usize,
    /// Whether an exclusive holder is currently inside the lock.
    exclusive_held: bool,
    /// Exclusive requesters blocked draining shared holders or waiting out
    /// a previous exclusive episode.
    exclusive_waiters: usize,
}

/// A writer-priority group mutual-exclusion lock, raw form.
///
/// Admits many concurrent shared holders; an exclusive requester blocks all
/// later shared admission, drains the current holders, and then has the lock
/// to itself until it leaves.
///
/// # Fairness
///
/// Shared holders admitted before an exclusive request are never forced out.
/// Among several simultaneously waiting exclusive requesters no ordering is
/// promised; whichever the platform wakes first wins.
#[derive(Debug, Default)]
pub struct RawGroupMutex {
    state: Mutex<AdmissionState>,
    /// Shared entrants waiting out an exclusive episode.
    shared_cv: Condvar,
    /// Exclusive requesters waiting for the drain.
    exclusive_cv: Condvar,
}

impl RawGroupMutex {
    /// Creates an unlocked group lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the lock in shared mode, blocking while an exclusive episode
    /// is pending or active.
    ///
    /// Never blocks when no exclusive requester is waiting or holding; in
    /// that case the call is a count increment under the internal mutex.
    pub fn enter_shared(&self) {
        let mut state = self.state.lock().expect("admission state poisoned");
        while state.exclusive_held || state.exclusive_waiters > 0 {
            state = self
                .shared_cv
                .wait(state)
                .expect("admission state poisoned");
        }
        state.shared_holders += 1;
    }

    /// Tries to enter the lock in shared mode without blocking.
    ///
    /// Fails when an exclusive episode is pending or active.
    #[must_use]
    pub fn try_enter_shared(&self) -> bool {
        let mut state = self.state.lock().expect("admission state poisoned");
        if state.exclusive_held || state.exclusive_waiters > 0 {
            return false;
        }
        state.shared_holders += 1;
        true
    }

    /// Leaves the lock's shared mode.
    ///
    /// When the last shared holder leaves while an exclusive requester is
    /// draining, that requester is woken.
    pub fn leave_shared(&self) {
        let mut state = self.state.lock().expect("admission state poisoned");
        debug_assert!(
            state.shared_holders > 0,
            "leave_shared without a matching enter_shared"
        );
        state.shared_holders = state.shared_holders.saturating_sub(1);
        if state.shared_holders == 0 && state.exclusive_waiters > 0 {
            tracing::trace!("last shared holder left; waking exclusive waiter");
            self.exclusive_cv.notify_one();
        }
    }

    /// Enters the lock in exclusive mode.
    ///
    /// Registers the exclusive request first — from that point no new shared
    /// entrant is admitted — then blocks until the current shared holders
    /// have drained and any active exclusive holder has left.
    pub fn enter_exclusive(&self) {
        let mut state = self.state.lock().expect("admission state poisoned");
        state.exclusive_waiters += 1;
        if state.shared_holders > 0 {
            tracing::trace!(
                shared_holders = state.shared_holders,
                "exclusive request draining shared holders"
            );
        }
        while state.exclusive_held || state.shared_holders > 0 {
            state = self
                .exclusive_cv
                .wait(state)
                .expect("admission state poisoned");
        }
        state.exclusive_waiters -= 1;
        state.exclusive_held = true;
    }

    /// Tries to enter the lock in exclusive mode without blocking.
    ///
    /// Fails when any shared holder is inside or another exclusive holder is
    /// active.
    #[must_use]
    pub fn try_enter_exclusive(&self) -> bool {
        let mut state = self.state.lock().expect("admission state poisoned");
        if state.exclusive_held || state.shared_holders > 0 {
            return false;
        }
        state.exclusive_held = true;
        true
    }

    /// Leaves the lock's exclusive mode.
    ///
    /// A waiting exclusive requester is preferred over blocked shared
    /// entrants; with no exclusive waiter, all blocked shared entrants are
    /// admitted together.
    pub fn leave_exclusive(&self) {
        let mut state = self.state.lock().expect("admission state poisoned");
        debug_assert!(
            state.exclusive_held,
            "leave_exclusive without a matching enter_exclusive"
        );
        state.exclusive_held = false;
        if state.exclusive_waiters > 0 {
            self.exclusive_cv.notify_one();
        } else {
            self.shared_cv.notify_all();
        }
    }

    /// Returns the number of threads currently inside the lock in shared
    /// mode.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        let state = self.state.lock().expect("admission state poisoned");
        state.shared_holders
    }

    /// Returns the number of exclusive requesters currently blocked.
    #[must_use]
    pub fn exclusive_waiters(&self) -> usize {
        let state = self.state.lock().expect("admission state poisoned");
        state.exclusive_waiters
    }

    /// Returns true while an exclusive holder is inside the lock.
    #[must_use]
    pub fn is_exclusive_held(&self) -> bool {
        let state = self.state.lock().expect("admission state poisoned");
        state.exclusive_held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn shared_entries_accumulate() {
        init_test("shared_entries_accumulate");
        let lock = RawGroupMutex::new();

        lock.enter_shared();
        lock.enter_shared();
        crate::assert_with_log!(
            lock.shared_holders() == 2,
            "two shared holders",
            2usize,
            lock.shared_holders()
        );

        lock.leave_shared();
        crate::assert_with_log!(
            lock.shared_holders() == 1,
            "still held after first leave",
            1usize,
            lock.shared_holders()
        );

        lock.leave_shared();
        crate::assert_with_log!(
            lock.shared_holders() == 0,
            "released after second leave",
            0usize,
            lock.shared_holders()
        );
        crate::test_complete!("shared_entries_accumulate");
    }

    #[test]
    fn try_exclusive_fails_under_shared_holders() {
        init_test("try_exclusive_fails_under_shared_holders");
        let lock = RawGroupMutex::new();

        lock.enter_shared();
        let refused = !lock.try_enter_exclusive();
        crate::assert_with_log!(refused, "exclusive refused", true, refused);

        lock.leave_shared();
        let admitted = lock.try_enter_exclusive();
        crate::assert_with_log!(admitted, "exclusive admitted after drain", true, admitted);

        lock.leave_exclusive();
        crate::test_complete!("try_exclusive_fails_under_shared_holders");
    }

    #[test]
    fn try_shared_fails_while_exclusive_held() {
        init_test("try_shared_fails_while_exclusive_held");
        let lock = RawGroupMutex::new();

        lock.enter_exclusive();
        let refused = !lock.try_enter_shared();
        crate::assert_with_log!(refused, "shared refused", true, refused);

        lock.leave_exclusive();
        let admitted = lock.try_enter_shared();
        crate::assert_with_log!(admitted, "shared admitted", true, admitted);

        lock.leave_shared();
        crate::test_complete!("try_shared_fails_while_exclusive_held");
    }

    #[test]
    fn exclusive_waits_for_shared_drain() {
        init_test("exclusive_waits_for_shared_drain");
        let lock = Arc::new(RawGroupMutex::new());
        lock.enter_shared();

        let entered = Arc::new(AtomicBool::new(false));
        let requester = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                lock.enter_exclusive();
                entered.store(true, Ordering::Release);
                lock.leave_exclusive();
            })
        };

        // The requester must register before we can observe it blocked.
        while lock.exclusive_waiters() == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(10));
        let still_blocked = !entered.load(Ordering::Acquire);
        crate::assert_with_log!(still_blocked, "blocked on drain", true, still_blocked);

        lock.leave_shared();
        requester.join().expect("requester thread");
        let woken = entered.load(Ordering::Acquire);
        crate::assert_with_log!(woken, "woken by last leave_shared", true, woken);
        crate::test_complete!("exclusive_waits_for_shared_drain");
    }

    #[test]
    fn pending_exclusive_blocks_new_shared() {
        init_test("pending_exclusive_blocks_new_shared");
        let lock = Arc::new(RawGroupMutex::new());
        lock.enter_shared();

        let requester = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.enter_exclusive();
                lock.leave_exclusive();
            })
        };

        while lock.exclusive_waiters() == 0 {
            thread::yield_now();
        }

        // A later shared request must be refused while the exclusive
        // requester is draining.
        let refused = !lock.try_enter_shared();
        crate::assert_with_log!(refused, "new shared refused", true, refused);

        lock.leave_shared();
        requester.join().expect("requester thread");
        crate::test_complete!("pending_exclusive_blocks_new_shared");
    }
}
