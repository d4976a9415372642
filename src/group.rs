//! Guarded group lock over a value.
//!
//! [`GroupMutex`] pairs the writer-priority admission protocol with a
//! protected value. Shared guards give `&T` to any number of holders at
//! once; an exclusive guard gives `&mut T` to a single holder, with
//! priority over later shared requests.
//!
//! # Example
//!
//! ```
//! use gatelock::GroupMutex;
//!
//! let lock = GroupMutex::new(vec![1, 2, 3]);
//!
//! // Any number of shared holders at once.
//! let a = lock.shared().unwrap();
//! let b = lock.shared().unwrap();
//! assert_eq!(a.len() + b.len(), 6);
//! drop((a, b));
//!
//! // One exclusive holder, with priority over later shared requests.
//! let mut w = lock.exclusive().unwrap();
//! w.push(4);
//! ```
//!
//! # Poisoning
//!
//! A holder that panics poisons the lock; later acquisitions report
//! [`EnterError::Poisoned`] rather than handing out state a panicking
//! section may have left half-updated.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use crate::raw::RawGroupMutex;

/// Error returned when entering the lock fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnterError {
    /// The lock was poisoned (a panic occurred while a guard was held).
    #[error("group lock poisoned")]
    Poisoned,
}

/// Error returned when trying to enter the lock without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryEnterError {
    /// The lock is held in a conflicting mode, or an exclusive request is
    /// pending.
    #[error("group lock is held in a conflicting mode")]
    Contended,
    /// The lock was poisoned.
    #[error("group lock poisoned")]
    Poisoned,
}

/// A writer-priority group lock protecting a value.
///
/// Admission goes through a [`RawGroupMutex`]; the value itself sits in a
/// `std::sync::RwLock` that is only ever taken after admission is won, so
/// taking it never blocks for more than a guard's drop window.
#[derive(Debug, Default)]
pub struct GroupMutex<T> {
    admission: RawGroupMutex,
    data: StdRwLock<T>,
    poisoned: AtomicBool,
}

impl<T> GroupMutex<T> {
    /// Creates a new lock containing the given value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            admission: RawGroupMutex::new(),
            data: StdRwLock::new(value),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Returns true if the lock is poisoned.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Returns the number of threads currently holding the lock in shared
    /// mode.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        self.admission.shared_holders()
    }

    /// Returns true while an exclusive holder is inside the lock.
    #[must_use]
    pub fn is_exclusive_held(&self) -> bool {
        self.admission.is_exclusive_held()
    }

    /// Enters shared mode, blocking while an exclusive episode is pending
    /// or active.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] if a previous holder panicked.
    pub fn shared(&self) -> Result<SharedGuard<'_, T>, EnterError> {
        if self.is_poisoned() {
            return Err(EnterError::Poisoned);
        }
        self.admission.enter_shared();
        match self.data.read() {
            Ok(guard) => Ok(SharedGuard { lock: self, guard }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_shared();
                drop(poisoned.into_inner());
                Err(EnterError::Poisoned)
            }
        }
    }

    /// Tries to enter shared mode without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TryEnterError::Contended`] while an exclusive episode is
    /// pending or active, [`TryEnterError::Poisoned`] if a previous holder
    /// panicked.
    pub fn try_shared(&self) -> Result<SharedGuard<'_, T>, TryEnterError> {
        if self.is_poisoned() {
            return Err(TryEnterError::Poisoned);
        }
        if !self.admission.try_enter_shared() {
            return Err(TryEnterError::Contended);
        }
        match self.data.read() {
            Ok(guard) => Ok(SharedGuard { lock: self, guard }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_shared();
                drop(poisoned.into_inner());
                Err(TryEnterError::Poisoned)
            }
        }
    }

    /// Enters exclusive mode, blocking until the current shared holders
    /// drain and any active exclusive holder leaves.
    ///
    /// From the moment this is called, no new shared entrant is admitted
    /// until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] if a previous holder panicked.
    pub fn exclusive(&self) -> Result<ExclusiveGuard<'_, T>, EnterError> {
        if self.is_poisoned() {
            return Err(EnterError::Poisoned);
        }
        self.admission.enter_exclusive();
        match self.data.write() {
            Ok(guard) => Ok(ExclusiveGuard { lock: self, guard }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_exclusive();
                drop(poisoned.into_inner());
                Err(EnterError::Poisoned)
            }
        }
    }

    /// Tries to enter exclusive mode without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TryEnterError::Contended`] while any holder is inside,
    /// [`TryEnterError::Poisoned`] if a previous holder panicked.
    pub fn try_exclusive(&self) -> Result<ExclusiveGuard<'_, T>, TryEnterError> {
        if self.is_poisoned() {
            return Err(TryEnterError::Poisoned);
        }
        if !self.admission.try_enter_exclusive() {
            return Err(TryEnterError::Contended);
        }
        match self.data.write() {
            Ok(guard) => Ok(ExclusiveGuard { lock: self, guard }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                self.admission.leave_exclusive();
                drop(poisoned.into_inner());
                Err(TryEnterError::Poisoned)
            }
        }
    }

    /// Returns a mutable reference to the protected value.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut().expect("group lock poisoned")
    }

    /// Consumes the lock and returns the protected value.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.data.into_inner().expect("group lock poisoned")
    }
}

/// Guard for a shared hold.
#[must_use = "guard will be immediately released if not held"]
pub struct SharedGuard<'a, T> {
    lock: &'a GroupMutex<T>,
    guard: std::sync::RwLockReadGuard<'a, T>,
}

impl<T> Deref for SharedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> Drop for SharedGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_shared();
    }
}

/// Guard for an exclusive hold.
#[must_use = "guard will be immediately released if not held"]
pub struct ExclusiveGuard<'a, T> {
    lock: &'a GroupMutex<T>,
    guard: std::sync::RwLockWriteGuard<'a, T>,
}

impl<T> Deref for ExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for ExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<T> Drop for ExclusiveGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_exclusive();
    }
}

/// Owned shared guard that can be moved between threads.
#[must_use = "guard will be immediately released if not held"]
pub struct OwnedSharedGuard<T> {
    lock: Arc<GroupMutex<T>>,
}

impl<T> OwnedSharedGuard<T> {
    /// Enters shared mode on an `Arc`-owned lock.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] if a previous holder panicked.
    pub fn shared(lock: Arc<GroupMutex<T>>) -> Result<Self, EnterError> {
        if lock.is_poisoned() {
            return Err(EnterError::Poisoned);
        }
        lock.admission.enter_shared();
        Ok(Self { lock })
    }

    /// Executes a closure with shared access to the value.
    pub fn with_shared<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.lock.data.read().expect("group lock poisoned");
        f(&guard)
    }
}

impl<T> Drop for OwnedSharedGuard<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_shared();
    }
}

/// Owned exclusive guard that can be moved between threads.
#[must_use = "guard will be immediately released if not held"]
pub struct OwnedExclusiveGuard<T> {
    lock: Arc<GroupMutex<T>>,
}

impl<T> OwnedExclusiveGuard<T> {
    /// Enters exclusive mode on an `Arc`-owned lock.
    ///
    /// # Errors
    ///
    /// Returns [`EnterError::Poisoned`] if a previous holder panicked.
    pub fn exclusive(lock: Arc<GroupMutex<T>>) -> Result<Self, EnterError> {
        if lock.is_poisoned() {
            return Err(EnterError::Poisoned);
        }
        lock.admission.enter_exclusive();
        Ok(Self { lock })
    }

    /// Executes a closure with exclusive access to the value.
    pub fn with_exclusive<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.lock.data.write().expect("group lock poisoned");
        f(&mut guard)
    }
}

impl<T> Drop for OwnedExclusiveGuard<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        self.lock.admission.leave_exclusive();
    }
}
