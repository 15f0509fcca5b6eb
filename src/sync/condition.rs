//! Persistent signals with "already fired" semantics.

use crate::sync::lock;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

/// Wake target registered by a [`crate::sync::ConditionSet`].
pub(crate) struct Waker {
    pub(crate) mutex: Mutex<()>,
    pub(crate) cvar: Condvar,
}

impl Waker {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    fn wake(&self) {
        // Taking the lock orders this wake after any waiter's check of the
        // member signals, which is what makes the set free of lost wakeups.
        let _guard = lock(&self.mutex);
        self.cvar.notify_all();
    }
}

/// Shared state behind [`Condition`] and [`OneShot`].
pub(crate) struct Signal {
    fired: Mutex<bool>,
    cvar: Condvar,
    watchers: Mutex<Vec<Weak<Waker>>>,
}

impl Signal {
    fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            cvar: Condvar::new(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        *lock(&self.fired)
    }

    fn notify(&self) {
        {
            let mut fired = lock(&self.fired);
            if *fired {
                return;
            }
            *fired = true;
        }
        self.cvar.notify_all();

        let watchers: Vec<Arc<Waker>> = {
            let mut watchers = lock(&self.watchers);
            watchers.retain(|w| w.strong_count() > 0);
            watchers.iter().filter_map(Weak::upgrade).collect()
        };
        for waker in watchers {
            waker.wake();
        }
    }

    fn reset(&self) -> bool {
        std::mem::replace(&mut *lock(&self.fired), false)
    }

    fn wait(&self) {
        let mut fired = lock(&self.fired);
        while !*fired {
            fired = self
                .cvar
                .wait(fired)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = lock(&self.fired);
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            fired = self
                .cvar
                .wait_timeout(fired, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    /// Register `waker` for the next firing. A fired signal that can never be
    /// reset needs no watcher, since waiters re-check its state directly.
    pub(crate) fn watch(&self, waker: &Arc<Waker>, resettable: bool) {
        let mut watchers = lock(&self.watchers);
        watchers.retain(|w| w.strong_count() > 0);
        // Checked under the watcher lock so a concurrent notify still sees
        // the push when it races this check.
        if !resettable && self.is_fired() {
            return;
        }
        watchers.push(Arc::downgrade(waker));
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        lock(&self.watchers).len()
    }
}

/// Resettable signal for recurring events (new data, property changes).
///
/// `notify` leaves the condition fired until `reset`; repeated notifies in
/// between are absorbed. Cloning yields another handle to the same signal.
#[derive(Clone)]
pub struct Condition {
    signal: Arc<Signal>,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    /// Block until the condition is fired. Returns immediately if it already is.
    pub fn wait(&self) {
        self.signal.wait();
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.signal.wait_timeout(timeout)
    }

    /// Fire the condition and wake every waiter. No-op while already fired.
    pub fn notify(&self) {
        self.signal.notify();
    }

    /// Return to the unfired state. Returns whether a firing was consumed.
    pub fn reset(&self) -> bool {
        self.signal.reset()
    }

    pub fn is_fired(&self) -> bool {
        self.signal.is_fired()
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.signal.watcher_count()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Strict one-shot signal for terminal events.
///
/// Once notified it can never be reset, so any number of late waiters observe
/// it immediately.
#[derive(Clone)]
pub struct OneShot {
    signal: Arc<Signal>,
}

impl OneShot {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    pub fn wait(&self) {
        self.signal.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.signal.wait_timeout(timeout)
    }

    pub fn notify(&self) {
        self.signal.notify();
    }

    pub fn is_fired(&self) -> bool {
        self.signal.is_fired()
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.signal.watcher_count()
    }
}

impl Default for OneShot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OneShot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShot")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Opaque reference to a signal, accepted by [`crate::sync::ConditionSet::add`].
#[derive(Clone)]
pub struct Watched {
    pub(crate) signal: Arc<Signal>,
    pub(crate) resettable: Option<Condition>,
}

impl From<&Condition> for Watched {
    fn from(c: &Condition) -> Self {
        Self {
            signal: c.signal.clone(),
            resettable: Some(c.clone()),
        }
    }
}

impl From<&OneShot> for Watched {
    fn from(c: &OneShot) -> Self {
        Self {
            signal: c.signal.clone(),
            resettable: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ConditionSet, EventKind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_one_shot_wait_after_notify_never_blocks() {
        let c = OneShot::new();
        c.notify();
        c.wait();
        c.wait();
        assert!(c.is_fired());
    }

    #[test]
    fn test_one_shot_wakes_all_waiters() {
        let c = OneShot::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || {
                    c.wait();
                    c.wait();
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        c.notify();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_wait_blocks_until_notify() {
        let c = OneShot::new();
        let flag = Arc::new(AtomicBool::new(false));

        let t = {
            let c = c.clone();
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
                c.notify();
            })
        };

        c.wait();
        assert!(flag.load(Ordering::SeqCst));
        t.join().unwrap();
    }

    #[test]
    fn test_repeated_notify_is_noop() {
        let c = Condition::new();
        c.notify();
        c.notify();
        c.notify();
        assert!(c.reset());
        assert!(!c.is_fired());
        assert!(!c.reset());
    }

    #[test]
    fn test_reset_requires_next_notify() {
        let c = Condition::new();
        c.notify();
        assert!(c.wait_timeout(Duration::from_millis(10)));
        c.reset();
        assert!(!c.wait_timeout(Duration::from_millis(20)));
        c.notify();
        assert!(c.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_fired_one_shot_keeps_no_watchers() {
        let c = OneShot::new();
        c.notify();
        for _ in 0..1000 {
            let set = ConditionSet::new();
            set.add(EventKind::Ready, &c);
            set.wait();
        }
        assert_eq!(c.watcher_count(), 0);
    }

    #[test]
    fn test_dropped_sets_are_pruned() {
        let c = Condition::new();
        c.notify();
        for _ in 0..1000 {
            let set = ConditionSet::new();
            set.add(EventKind::DataChanged, &c);
            set.wait();
        }
        // Only the most recent, already dropped, registration is left.
        assert_eq!(c.watcher_count(), 1);

        let pending = OneShot::new();
        for _ in 0..100 {
            let set = ConditionSet::new();
            set.add(EventKind::Shutdown, &pending);
        }
        assert_eq!(pending.watcher_count(), 1);
    }

    #[test]
    fn test_wait_timeout_expires() {
        let c = OneShot::new();
        assert!(!c.wait_timeout(Duration::from_millis(10)));
    }
}
