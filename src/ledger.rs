//! The deferred-work ledger (§5, §9): the inviolable rule is that no
//! user-supplied closure and no user-owned value's destructor ever runs
//! while an internal [`Mutex`](std::sync::Mutex) is held. Every function in
//! this crate that must run user code under a lock instead pushes a closure
//! onto a `Ledger` and returns; the public entry point that created the
//! ledger drains it after releasing every lock it was holding.

/// A stack-allocated, append-only list of closures to run outside any
/// internal mutex.
///
/// Every public entry point (`send`, `join`, `capture`, drop impls that
/// tear down a node, ...) constructs one of these on the stack, threads it
/// by `&mut` through any mutex-holding helper, and calls [`Ledger::run`] on
/// the way out. Closures typically own the very values (queued items,
/// dropped predecessors, user callbacks) whose destruction must not happen
/// under a lock.
#[must_use = "a Ledger must be run (or explicitly dropped) after its locks are released"]
pub struct Ledger {
    work: Vec<Box<dyn FnOnce() + Send>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self { work: Vec::new() }
    }

    /// Appends a closure to run once every lock that contributed to this
    /// ledger has been released.
    pub fn defer(&mut self, f: impl FnOnce() + Send + 'static) {
        self.work.push(Box::new(f));
    }

    /// Drains and runs every deferred closure, in the order they were
    /// appended. Must only be called from a context holding no internal
    /// mutex.
    pub fn run(mut self) {
        for f in self.work.drain(..) {
            f();
        }
    }

    /// True if no work has been deferred; lets callers skip an empty drain.
    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        // A non-empty ledger dropped without `run()` would silently skip
        // user callbacks (activation notifications, dropped queue items,
        // error handlers). That is always an engine bug, not a recoverable
        // condition, so make it loud in debug builds rather than let
        // notifications vanish.
        debug_assert!(
            self.work.is_empty(),
            "Ledger dropped with {} deferred closures unrun",
            self.work.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn run_executes_deferred_closures_in_append_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = Ledger::new();
        for i in 0..5 {
            let sink = log.clone();
            ledger.defer(move || sink.lock().unwrap().push(i));
        }
        ledger.run();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn a_fresh_ledger_is_empty() {
        assert!(Ledger::new().is_empty());
    }

    #[test]
    fn deferring_work_clears_is_empty() {
        let mut ledger = Ledger::new();
        ledger.defer(|| {});
        assert!(!ledger.is_empty());
        ledger.run();
    }

    #[test]
    #[should_panic(expected = "deferred closures unrun")]
    #[cfg(debug_assertions)]
    fn dropping_a_non_empty_ledger_panics_in_debug_builds() {
        let mut ledger = Ledger::new();
        ledger.defer(|| {});
        drop(ledger);
    }
}
