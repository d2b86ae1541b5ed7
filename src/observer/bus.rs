//! Thread-affine observer bus
//!
//! Observers register together with the execution context their callbacks
//! must run on. Notifications are never delivered inline on the notifying
//! context; each live observer gets a task posted to its own context.
//! Registrations hold the observer weakly, so the bus never extends an
//! observer's lifetime and a destroyed observer is silently skipped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::executor::TaskContext;

struct Registration<T: ?Sized> {
    observer: Weak<T>,
    context: TaskContext,
}

/// Type-filtered publish/subscribe with per-observer dispatch contexts
///
/// The registration list is the one structure in the crate that is read and
/// written from multiple contexts; it is guarded by a short-held lock that
/// is never held while observer code runs.
pub struct ObserverBus<T: ?Sized> {
    registrations: Mutex<Vec<Registration<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> ObserverBus<T> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer with the context its callbacks run on
    ///
    /// Duplicate registrations are permitted; each delivers separately.
    pub fn add_observer(&self, observer: &Arc<T>, context: TaskContext) {
        self.registrations.lock().push(Registration {
            observer: Arc::downgrade(observer),
            context,
        });
    }

    /// Remove a registration by observer identity
    ///
    /// Matches by pointer identity, not value; removes the first matching
    /// entry only, so duplicate registrations are removed one at a time.
    pub fn remove_observer(&self, observer: &Arc<T>) {
        let target = Arc::downgrade(observer);
        let mut regs = self.registrations.lock();
        if let Some(pos) = regs.iter().position(|r| r.observer.ptr_eq(&target)) {
            regs.remove(pos);
        }
    }

    /// Remove every registration
    pub fn clear(&self) {
        self.registrations.lock().clear();
    }

    /// Number of registrations, including ones whose observer has died
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Whether the bus has no registrations
    pub fn is_empty(&self) -> bool {
        self.registrations.lock().is_empty()
    }

    /// Deliver `f` to every live observer on its registered context
    ///
    /// Takes a snapshot of the registration list; observers added after the
    /// snapshot may miss this particular notification. Dead registrations
    /// are pruned here, lazily. The observer is upgraded inside the posted
    /// task, so an observer destroyed between snapshot and dispatch is
    /// skipped rather than invoked.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let snapshot: Vec<(Weak<T>, TaskContext)> = {
            let mut regs = self.registrations.lock();
            regs.retain(|r| r.observer.strong_count() > 0);
            regs.iter()
                .map(|r| (r.observer.clone(), r.context.clone()))
                .collect()
        };

        let f = Arc::new(f);
        for (observer, context) in snapshot {
            let f = Arc::clone(&f);
            context.post(move || {
                if let Some(observer) = observer.upgrade() {
                    f(&observer);
                }
            });
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for ObserverBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
