//! Wait on the logical OR of several signals.
//!
//! A wake does not say which member fired; callers re-check each member with
//! [`ConditionSet::is_fired`] (or take a [`ConditionSet::fired`] snapshot).

use crate::sync::condition::{Waker, Watched};
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The kind of event a member signal stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// New data (or data removal) arrived on an input connector.
    DataChanged,
    /// A property of the module was written.
    PropertyChanged,
    /// The module must shut down.
    Shutdown,
    /// The module became ready.
    Ready,
    /// The module thread returned.
    Finished,
    /// Module-defined condition.
    Custom(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::DataChanged => write!(f, "data changed"),
            EventKind::PropertyChanged => write!(f, "property changed"),
            EventKind::Shutdown => write!(f, "shutdown"),
            EventKind::Ready => write!(f, "ready"),
            EventKind::Finished => write!(f, "finished"),
            EventKind::Custom(name) => write!(f, "custom \"{}\"", name),
        }
    }
}

/// A mapping from [`EventKind`] to signal that one thread can block on.
pub struct ConditionSet {
    waker: Arc<Waker>,
    members: Mutex<Vec<(EventKind, Watched)>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self {
            waker: Arc::new(Waker::new()),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Add a signal under `kind`. A kind that is already present is replaced.
    pub fn add(&self, kind: EventKind, signal: impl Into<Watched>) {
        let watched = signal.into();
        watched
            .signal
            .watch(&self.waker, watched.resettable.is_some());

        let mut members = lock(&self.members);
        if let Some(slot) = members.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = watched;
        } else {
            members.push((kind, watched));
        }
        drop(members);

        // A waiter may be parked already; let it re-check with the new member.
        let _guard = lock(&self.waker.mutex);
        self.waker.cvar.notify_all();
    }

    pub fn contains(&self, kind: &EventKind) -> bool {
        lock(&self.members).iter().any(|(k, _)| k == kind)
    }

    /// Whether the member registered under `kind` is currently fired.
    pub fn is_fired(&self, kind: &EventKind) -> bool {
        lock(&self.members)
            .iter()
            .any(|(k, w)| k == kind && w.signal.is_fired())
    }

    /// Kinds of all currently fired members, in the order they were added.
    pub fn fired(&self) -> Vec<EventKind> {
        lock(&self.members)
            .iter()
            .filter(|(_, w)| w.signal.is_fired())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Reset the member under `kind` if it is resettable. Returns whether a
    /// firing was consumed.
    pub fn reset(&self, kind: &EventKind) -> bool {
        let cond = lock(&self.members)
            .iter()
            .find(|(k, _)| k == kind)
            .and_then(|(_, w)| w.resettable.clone());
        cond.map(|c| c.reset()).unwrap_or(false)
    }

    fn any_fired(&self) -> bool {
        lock(&self.members).iter().any(|(_, w)| w.signal.is_fired())
    }

    /// Block until at least one member is fired.
    pub fn wait(&self) {
        let mut guard = lock(&self.waker.mutex);
        while !self.any_fired() {
            guard = self
                .waker
                .cvar
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns whether a member fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = lock(&self.waker.mutex);
        while !self.any_fired() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .waker
                .cvar
                .wait_timeout(guard, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }
}

impl Default for ConditionSet {
    fn default() -> Self {
        Self::new()
    }
}
