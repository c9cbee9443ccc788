//! Monotonic counters, the `counter_leaf` grammar production's target.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use simloom_core::{Error, Result};

struct Watcher {
    threshold: f64,
    callback: Option<Box<dyn FnMut()>>,
}

struct CounterInner {
    value: u64,
    watchers: Vec<Watcher>,
}

/// A monotonically increasing counter (`core0.rob.retired`-style paths).
///
/// Only `>=` thresholds are meaningful against a monotonic value, matching
/// the grammar's restriction that `counter_leaf` accepts no other
/// comparator.
#[derive(Clone)]
pub struct Counter(Rc<RefCell<CounterInner>>);

impl Counter {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(CounterInner { value: 0, watchers: Vec::new() })))
    }

    pub fn value(&self) -> u64 {
        self.0.borrow().value
    }

    /// Increment by `delta`, firing (and dropping) every watcher whose
    /// threshold this crosses.
    pub fn increment(&self, delta: u64) {
        let mut inner = self.0.borrow_mut();
        inner.value += delta;
        let value = inner.value as f64;

        for watcher in inner.watchers.iter_mut() {
            if value >= watcher.threshold {
                if let Some(mut callback) = watcher.callback.take() {
                    callback();
                }
            }
        }
        inner.watchers.retain(|w| w.callback.is_some());
    }

    /// Register a one-shot callback that fires the moment the counter's
    /// value reaches or exceeds `threshold`. Fires immediately, inline, if
    /// the counter has already reached it.
    pub fn watch_threshold(&self, threshold: f64, mut callback: impl FnMut() + 'static) {
        let mut inner = self.0.borrow_mut();
        if inner.value as f64 >= threshold {
            drop(inner);
            callback();
            return;
        }
        inner.watchers.push(Watcher { threshold, callback: Some(Box::new(callback)) });
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// A named directory of [`Counter`]s, resolved by dotted path.
#[derive(Default)]
pub struct CounterTable {
    counters: AHashMap<String, Counter>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self { counters: AHashMap::default() }
    }

    pub fn declare(&mut self, path: impl Into<String>) -> Counter {
        self.counters.entry(path.into()).or_insert_with(Counter::new).clone()
    }

    pub fn get(&self, path: &str) -> Result<Counter> {
        self.counters
            .get(path)
            .cloned()
            .ok_or_else(|| Error::UnknownName(format!("no counter named '{path}' is declared")))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn watcher_fires_once_on_crossing() {
        let counter = Counter::new();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();
        counter.watch_threshold(1000.0, move || *fired2.borrow_mut() += 1);

        counter.increment(999);
        assert_eq!(*fired.borrow(), 0);

        counter.increment(1);
        assert_eq!(*fired.borrow(), 1);

        counter.increment(1);
        assert_eq!(*fired.borrow(), 1, "watcher does not re-fire after removal");
    }

    #[test]
    fn watch_fires_immediately_if_already_past_threshold() {
        let counter = Counter::new();
        counter.increment(5);
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        counter.watch_threshold(3.0, move || *fired2.borrow_mut() = true);
        assert!(*fired.borrow());
    }

    #[test]
    fn table_resolves_declared_counters_by_path() {
        let mut table = CounterTable::new();
        let c = table.declare("core0.rob.retired");
        c.increment(10);
        assert_eq!(table.get("core0.rob.retired").unwrap().value(), 10);
        assert!(table.get("missing").is_err());
    }
}
