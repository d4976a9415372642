//! Busy-wait form of the group lock.
//!
//! [`RawSpinGroupMutex`] offers the same four-operation contract as
//! [`RawGroupMutex`] without any blocking or wake primitive: an admission
//! spinlock serializes entry decisions, and the exclusive path spins until
//! the shared-holder count reads zero. Suited to very short critical
//! sections where parking a thread costs more than burning the wait;
//! under long holds it wastes a core per waiter.
//!
//! [`SpinGroupMutex`] is the data-carrying, guarded wrapper, shaped like
//! [`GroupMutex`].
//!
//! # Priority
//!
//! Exclusive priority is inherited from the admission spinlock: an
//! exclusive requester holds admission for its whole episode, so every
//! later shared entrant spins at the admission gate until the exclusive
//! holder leaves. Shared holders admitted earlier drain naturally while
//! the exclusive requester polls the count.
//!
//! [`RawGroupMutex`]: crate::raw::RawGroupMutex
//! [`GroupMutex`]: crate::group::GroupMutex

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock as StdRwLock;

use crate::group::{EnterError, TryEnterError};

/// A writer-priority group lock that busy-waits instead of blocking.
///
/// Same pairing obligation as [`RawGroupMutex`]: every `enter_*` must be
/// matched by exactly one `leave_*`.
///
/// [`RawGroupMutex`]: crate::raw::RawGroupMutex
#[derive(Debug, Default)]
pub struct RawSpinGroupMutex {
    /// Admission gate. Held briefly by shared entrants, and for the whole
    /// episode by an exclusive holder.
    admission: AtomicBool,
    shared_holders: AtomicUsize,
}

impl RawSpinGroupMutex {
    /// Creates an unlocked spin group lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            admission: AtomicBool::new(false),
            shared_holders: AtomicUsize::new(0),
        }
    }

    fn acquire_admission(&self) {
        loop {
            if self
                .admission
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.admission.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    fn try_acquire_admission(&self) -> bool {
        self.admission
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release_admission(&self) {
        self.admission.store(false, Ordering::Release);
    }

    /// Enters the lock in shared mode, spinning while an exclusive episode
    /// holds the admission gate.
    pub fn enter_shared(&self) {
        self.acquire_admission();
        self.shared_holders.fetch_add(1, Ordering::Relaxed);
        self.release_admission();
    }

    /// Tries to enter the lock in shared mode without spinning.
    ///
    /// Fails when the admission gate is held, whether by an exclusive
    /// episode or momentarily by another entrant.
    #[must_use]
    pub fn try_enter_shared(&self) -> bool {
        if !self.try_acquire_admission() {
            return false;
        }
        self.shared_holders.fetch_add(1, Ordering::Relaxed);
        self.release_admission();
        true
    }

    /// Leaves the lock's shared mode.
    pub fn leave_shared(&self) {
        let prev = self.shared_holders.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "leave_shared without a matching enter_shared");
    }

    /// Enters the lock in exclusive mode, spinning until the current
    /// shared holders have drained.
    ///
    /// The admission gate is held for the whole exclusive episode, so no
    /// new shared entrant is admitted while this spins or holds.
    pub fn enter_exclusive(&self) {
        self.acquire_admission();
        while self.shared_holders.load(Ordering::Acquire) > 0 {
            spin_loop();
        }
    }

    /// Tries to enter the lock in exclusive mode without spinning.
    ///
    /// Fails when the admission gate is held or any shared holder is
    /// inside.
    #[must_use]
    pub fn try_enter_exclusive(&self) -> bool {
        if !self.try_acquire_admission() {
            return false;
        }
        if self.shared_holders.load(Ordering::Acquire) > 0 {
            self.release_admission();
            return false;
        }
        true
    }

    /// Leaves the lock's exclusive mode, reopening admission.
    pub fn leave_exclusive(&self) {
        debug_assert!(
            self.admission.load(Ordering::Relaxed),
            "leave_exclusive without a matching enter_exclusive"
        );
        self.release_admission();
    }

    /// Returns the number of threads currently inside the lock in shared
    /// mode.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        self.shared_holders.load(Ordering::Relaxed)
    }
}

/// A busy-waiting writer-priority group lock around a value.
///
/// The guarded counterpart of [`RawSpinGroupMutex`], with the same surface
/// as [`GroupMutex`]: RAII guards, try variants, poisoning on a panicking
/// holder.
///
/// [`GroupMutex`]: crate::group::GroupMutex
#[derive(Debug, Default)]
pub struct SpinGroupMutex<T> {
    admission: RawSpinGroupMutex,
    data: StdRwLock<T>,
    poisoned: AtomicBool,
}

impl<T> SpinGroupMutex<T> {
    /// Creates an unlocked lock around `value`.
    pub fn new(value: T) -> Self {
        Self {
            admission: RawSpinGroupMutex::new(),
            data: StdRwLock::new(value),
            poisoned: AtomicBool::new(false),
        }
    }

    fn check_poison(&self) -> Result<(), EnterError> {
        if self.poisoned.load(Ordering::Acquire) {
            Err(EnterError::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Enters shared mode, spinning out any exclusive episode.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] when a previous holder panicked.
    pub fn shared(&self) -> Result<SpinSharedGuard<'_, T>, EnterError> {
        self.check_poison()?;
        self.admission.enter_shared();
        match self.data.read() {
            Ok(data) => Ok(SpinSharedGuard { lock: self, data }),
            Err(_) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_shared();
                Err(EnterError::Poisoned)
            }
        }
    }

    /// Enters exclusive mode, spinning until the shared holders drain.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] when a previous holder panicked.
    pub fn exclusive(&self) -> Result<SpinExclusiveGuard<'_, T>, EnterError> {
        self.check_poison()?;
        self.admission.enter_exclusive();
        match self.data.write() {
            Ok(data) => Ok(SpinExclusiveGuard { lock: self, data }),
            Err(_) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_exclusive();
                Err(EnterError::Poisoned)
            }
        }
    }

    /// Tries to enter shared mode without spinning.
    ///
    /// # Errors
    ///
    /// Returns [`TryEnterError::Contended`] when the admission gate is
    /// held, or [`TryEnterError::Poisoned`] when a previous holder
    /// panicked.
    pub fn try_shared(&self) -> Result<SpinSharedGuard<'_, T>, TryEnterError> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(TryEnterError::Poisoned);
        }
        if !self.admission.try_enter_shared() {
            return Err(TryEnterError::Contended);
        }
        match self.data.read() {
            Ok(data) => Ok(SpinSharedGuard { lock: self, data }),
            Err(_) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_shared();
                Err(TryEnterError::Poisoned)
            }
        }
    }

    /// Tries to enter exclusive mode without spinning.
    ///
    /// # Errors
    ///
    /// Returns [`TryEnterError::Contended`] when any holder is inside, or
    /// [`TryEnterError::Poisoned`] when a previous holder panicked.
    pub fn try_exclusive(&self) -> Result<SpinExclusiveGuard<'_, T>, TryEnterError> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(TryEnterError::Poisoned);
        }
        if !self.admission.try_enter_exclusive() {
            return Err(TryEnterError::Contended);
        }
        match self.data.write() {
            Ok(data) => Ok(SpinExclusiveGuard { lock: self, data }),
            Err(_) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_exclusive();
                Err(TryEnterError::Poisoned)
            }
        }
    }

    /// Returns a mutable reference to the value, without locking.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut().expect("spin group lock poisoned")
    }

    /// Consumes the lock, returning the value.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn into_inner(self) -> T {
        self.data.into_inner().expect("spin group lock poisoned")
    }

    /// Returns true when a previous holder panicked.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Returns the number of threads currently inside in shared mode.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        self.admission.shared_holders()
    }
}

/// RAII shared access to a [`SpinGroupMutex`].
#[must_use = "guard will be immediately released if not held"]
#[derive(Debug)]
pub struct SpinSharedGuard<'a, T> {
    lock: &'a SpinGroupMutex<T>,
    data: std::sync::RwLockReadGuard<'a, T>,
}

impl<T> std::ops::Deref for SpinSharedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> Drop for SpinSharedGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_shared();
    }
}

/// RAII exclusive access to a [`SpinGroupMutex`].
#[must_use = "guard will be immediately released if not held"]
#[derive(Debug)]
pub struct SpinExclusiveGuard<'a, T> {
    lock: &'a SpinGroupMutex<T>,
    data: std::sync::RwLockWriteGuard<'a, T>,
}

impl<T> std::ops::Deref for SpinExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::DerefMut for SpinExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> Drop for SpinExclusiveGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_exclusive();
    }
}
