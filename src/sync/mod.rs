//! Synchronization primitives for module threads.
//!
//! A [`Condition`] is a persistent signal: once notified it stays fired until
//! reset, so a waiter arriving after the notification never blocks. A
//! [`OneShot`] is the same signal without reset, used for terminal events
//! such as shutdown. A [`ConditionSet`] waits on the logical OR of several
//! signals keyed by [`EventKind`].

pub mod condition;
pub mod condition_set;

pub use condition::{Condition, OneShot, Watched};
pub use condition_set::{ConditionSet, EventKind};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking module poisoned it.
///
/// Module code runs under `catch_unwind`, so a poisoned lock only means a
/// module died mid-update; every kernel structure stays consistent because
/// values are replaced whole.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
