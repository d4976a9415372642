//! Gatelock: writer-priority group locks for threads.
//!
//! # Overview
//!
//! Gatelock is a family of mutual-exclusion primitives built around one
//! admission policy: any number of *shared* holders may be inside a lock
//! at once, while an *exclusive* requester takes priority — from the
//! moment it asks, no new shared entrant is admitted, the current holders
//! drain naturally, and the requester proceeds alone once the last of
//! them has left.
//!
//! # Core Guarantees
//!
//! - **No overlap**: an exclusive holder never coexists with any other
//!   holder, shared or exclusive
//! - **Exclusive priority**: a pending exclusive request stops all later
//!   shared admission until it has been served
//! - **No eviction**: shared holders admitted before an exclusive request
//!   are never forced out; they leave on their own schedule
//! - **No lost wakeups**: the drain hand-off is performed under the same
//!   mutex that guards the waiter's condition check
//! - **RAII discharge**: guarded forms pair every enter with exactly one
//!   leave; raw forms document the pairing obligation instead
//!
//! # Module Structure
//!
//! - [`raw`]: [`RawGroupMutex`], the four-operation admission protocol
//! - [`group`]: [`GroupMutex`], the data-carrying guarded wrapper
//! - [`reentrant`]: [`ReentrantGroupMutex`], per-thread reentry in both
//!   modes plus the shared-to-exclusive transition
//! - [`spin`]: [`RawSpinGroupMutex`] and [`SpinGroupMutex`], busy-wait
//!   forms with no wake primitive
//! - [`validity`]: [`ValidityLock`], a refcounted validity flag for
//!   observers of a deletable owner
//! - [`test_utils`]: logging and assertion helpers shared by the tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]

pub mod group;
pub mod raw;
pub mod reentrant;
pub mod spin;
pub mod test_utils;
pub mod validity;

pub use group::{
    EnterError, ExclusiveGuard, GroupMutex, OwnedExclusiveGuard, OwnedSharedGuard, SharedGuard,
    TryEnterError,
};
pub use raw::RawGroupMutex;
pub use reentrant::{ReentrantExclusiveGuard, ReentrantGroupMutex, ReentrantSharedGuard};
pub use spin::{RawSpinGroupMutex, SpinExclusiveGuard, SpinGroupMutex, SpinSharedGuard};
pub use validity::{ValidityGuard, ValidityLock};
