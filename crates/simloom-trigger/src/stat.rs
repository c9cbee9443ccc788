//! `StatisticDef` resolution for `stat_def.*` leaves.

use std::rc::Rc;

use ahash::AHashMap;
use simloom_core::{Error, Result};

/// A named, host-supplied statistic evaluator (`stat_def.path.func`).
///
/// Evaluators are kept behind `Rc` rather than `Box` so a trigger leaf that
/// needs to poll a statistic every tick can own a cloned handle that
/// outlives the [`crate::resolve::TriggerContext`] borrow used to resolve
/// it.
#[derive(Default)]
pub struct StatRegistry {
    stats: AHashMap<String, Rc<dyn Fn() -> f64>>,
}

impl StatRegistry {
    pub fn new() -> Self {
        Self { stats: AHashMap::default() }
    }

    pub fn define(&mut self, path: impl Into<String>, evaluator: impl Fn() -> f64 + 'static) {
        self.stats.insert(path.into(), Rc::new(evaluator));
    }

    pub fn evaluate(&self, path: &str) -> Result<f64> {
        Ok((self.evaluator(path)?)())
    }

    /// Clone out an owned handle to the evaluator at `path`, for callers
    /// that need to poll it after this registry's borrow has ended.
    pub fn evaluator(&self, path: &str) -> Result<Rc<dyn Fn() -> f64>> {
        self.stats
            .get(path)
            .cloned()
            .ok_or_else(|| Error::UnknownName(format!("no statistic defined at path '{path}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_defined_statistic() {
        let mut stats = StatRegistry::new();
        stats.define("core0.ipc.mean", || 1.5);
        assert_eq!(stats.evaluate("core0.ipc.mean").unwrap(), 1.5);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let stats = StatRegistry::new();
        assert!(stats.evaluate("missing").is_err());
    }
}
