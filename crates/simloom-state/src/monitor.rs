//! Reentrancy bookkeeping shared by the `State<T>` variants.
//!
//! Monitors run synchronously inside `set`, in registration order, and may
//! themselves call `set` on a different key. Exactly one level of that
//! nesting is permitted; anything deeper is a bug in the handler tree, not
//! a case to silently tolerate.

use std::cell::Cell;

use simloom_core::Error;
use tracing::error;

pub(crate) struct ReentrancyGuard {
    depth: Cell<u8>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self { depth: Cell::new(0) }
    }

    /// Enter a `set` call. Returns `Err` if this would be the third nested
    /// call (i.e. more than one level of monitor-triggered re-entry).
    pub fn enter(&self) -> Result<(), Error> {
        if self.depth.get() >= 2 {
            error!("monitor re-entered set() more than one level deep");
            return Err(Error::ReentrantModification(
                "monitor re-entered set() more than one level deep".into(),
            ));
        }
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    pub fn exit(&self) {
        self.depth.set(self.depth.get() - 1);
    }

    pub fn in_monitor(&self) -> bool {
        self.depth.get() > 0
    }

    /// Guard against observer-list mutation from within a monitor callback.
    pub fn reject_if_in_monitor(&self, what: &str) -> Result<(), Error> {
        if self.in_monitor() {
            error!(what, "observer list mutated from within a monitor callback");
            return Err(Error::ReentrantModification(format!(
                "{what} may not be called from within a monitor"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_level_of_nesting_is_allowed() {
        let guard = ReentrancyGuard::new();
        guard.enter().unwrap();
        guard.enter().unwrap();
        guard.exit();
        guard.exit();
    }

    #[test]
    fn second_level_of_nesting_is_rejected() {
        let guard = ReentrancyGuard::new();
        guard.enter().unwrap();
        guard.enter().unwrap();
        assert!(matches!(guard.enter(), Err(Error::ReentrantModification(_))));
        guard.exit();
        guard.exit();
    }

    #[test]
    fn observer_mutation_is_rejected_only_while_inside_a_monitor() {
        let guard = ReentrancyGuard::new();
        assert!(guard.reject_if_in_monitor("observe").is_ok());
        guard.enter().unwrap();
        assert!(guard.reject_if_in_monitor("observe").is_err());
        guard.exit();
    }
}
