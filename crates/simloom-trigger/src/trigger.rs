//! Trigger runtime: a boolean expression tree over edge-triggered leaves.

use std::cell::RefCell;
use std::rc::Rc;

/// The resolved, index-addressed counterpart of [`crate::ast::Expr`]. Each
/// [`EvalNode::Leaf`] refers to a slot in the owning [`Trigger`]'s
/// fired-leaf vector.
#[derive(Clone, Debug)]
pub(crate) enum EvalNode {
    Leaf(usize),
    All(Vec<EvalNode>),
    Any(Vec<EvalNode>),
}

impl EvalNode {
    pub(crate) fn eval(&self, fired: &[bool]) -> bool {
        match self {
            EvalNode::Leaf(i) => fired[*i],
            EvalNode::All(children) => children.iter().all(|c| c.eval(fired)),
            EvalNode::Any(children) => children.iter().any(|c| c.eval(fired)),
        }
    }
}

struct Inner {
    tree: EvalNode,
    fired_leaves: Vec<bool>,
    fired: bool,
    callback: Option<Box<dyn FnMut()>>,
    dependents: Vec<(Trigger, usize)>,
    /// The comparator's right-hand side for each leaf, as parsed from the
    /// expression (`None` for a tag-reference leaf, which carries no
    /// threshold of its own). Recorded at construction time so a caller can
    /// later ask what value a fired leaf was watching for, independent of
    /// the live state of whatever it was watching.
    leaf_targets: Vec<Option<f64>>,
}

/// A compound or leaf boolean condition built from the expression grammar,
/// or directly via [`Trigger::leaf`] for a single watched condition.
///
/// Cheap to clone: every clone shares the same underlying state, matching
/// the source's "borrowed reference, tracked by a process-wide registry"
/// model from a Trigger's tagged dependents.
#[derive(Clone)]
pub struct Trigger(Rc<RefCell<Inner>>);

impl Trigger {
    pub(crate) fn new(
        tree: EvalNode,
        leaf_count: usize,
        callback: impl FnMut() + 'static,
    ) -> Self {
        Self::with_targets(tree, vec![None; leaf_count], callback)
    }

    /// As [`Trigger::new`], but recording the threshold each leaf was
    /// constructed to watch for, retrievable later via
    /// [`Trigger::original_target_value`].
    pub(crate) fn with_targets(
        tree: EvalNode,
        leaf_targets: Vec<Option<f64>>,
        callback: impl FnMut() + 'static,
    ) -> Self {
        let fired_leaves = vec![false; leaf_targets.len()];
        Self(Rc::new(RefCell::new(Inner {
            tree,
            fired_leaves,
            fired: false,
            callback: Some(Box::new(callback)),
            dependents: Vec::new(),
            leaf_targets,
        })))
    }

    /// A trigger over a single leaf, with no further boolean structure.
    pub(crate) fn leaf(callback: impl FnMut() + 'static) -> Self {
        Self::new(EvalNode::Leaf(0), 1, callback)
    }

    pub fn has_fired(&self) -> bool {
        self.0.borrow().fired
    }

    /// The threshold value leaf `leaf_idx` was constructed to compare
    /// against, or `None` if that leaf carries no threshold of its own
    /// (a tag-reference leaf) or the index is out of range.
    pub fn original_target_value_at(&self, leaf_idx: usize) -> Option<f64> {
        self.0.borrow().leaf_targets.get(leaf_idx).copied().flatten()
    }

    /// The threshold value this trigger was constructed to watch for, for
    /// the common case of a trigger built over a single leaf (e.g. a bare
    /// `core0.rob.retired >= 1000` expression). `None` for a compound
    /// trigger with more than one leaf, or a tag-reference leaf with no
    /// threshold of its own; use [`Trigger::original_target_value_at`] to
    /// inspect an individual leaf of a compound trigger.
    pub fn original_target_value(&self) -> Option<f64> {
        let inner = self.0.borrow();
        match inner.leaf_targets.as_slice() {
            [single] => *single,
            _ => None,
        }
    }

    /// Record that leaf `leaf_idx` has been satisfied. If this makes the
    /// whole expression true, fires the callback and propagates to
    /// dependents.
    ///
    /// A no-op if the trigger has already fired (and has not since been
    /// [`reschedule`](Trigger::reschedule)d).
    pub fn notify(&self, leaf_idx: usize) {
        let should_fire = {
            let mut inner = self.0.borrow_mut();
            if inner.fired {
                return;
            }
            inner.fired_leaves[leaf_idx] = true;
            inner.tree.eval(&inner.fired_leaves)
        };

        if should_fire {
            self.fire();
        }
    }

    fn fire(&self) {
        let (mut callback, dependents) = {
            let mut inner = self.0.borrow_mut();
            inner.fired = true;
            (inner.callback.take(), inner.dependents.clone())
        };

        if let Some(callback) = callback.as_mut() {
            callback();
        }

        self.0.borrow_mut().callback = callback;

        for (dependent, leaf_idx) in dependents {
            dependent.notify(leaf_idx);
        }
    }

    /// Rearm every leaf and clear the fired flag, so the next qualifying
    /// round of leaf notifications fires the callback again.
    ///
    /// Only legal from inside the trigger's own callback. Leaves backed by
    /// a one-shot watcher (counter thresholds; see
    /// [`crate::counter::Counter`]) do not reattach on reschedule, since a
    /// monotonic counter cannot un-cross a threshold it has already passed.
    pub fn reschedule(&self) {
        let mut inner = self.0.borrow_mut();
        inner.fired = false;
        for flag in inner.fired_leaves.iter_mut() {
            *flag = false;
        }
    }

    /// Register `dependent` to be notified at `leaf_idx` whenever `self`
    /// fires. Used to wire a tag-reference leaf to the trigger it refers
    /// to.
    pub(crate) fn add_dependent(&self, dependent: Trigger, leaf_idx: usize) {
        self.0.borrow_mut().dependents.push((dependent, leaf_idx));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn all_policy_fires_only_once_every_leaf_has_fired() {
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();
        let trigger = Trigger::new(
            EvalNode::All(vec![EvalNode::Leaf(0), EvalNode::Leaf(1)]),
            2,
            move || *count2.borrow_mut() += 1,
        );

        trigger.notify(0);
        assert_eq!(*count.borrow(), 0);
        trigger.notify(1);
        assert_eq!(*count.borrow(), 1);
        // Further notifies before reschedule are ignored.
        trigger.notify(0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn any_policy_fires_on_first_leaf() {
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();
        let trigger = Trigger::new(
            EvalNode::Any(vec![EvalNode::Leaf(0), EvalNode::Leaf(1)]),
            2,
            move || *count2.borrow_mut() += 1,
        );

        trigger.notify(1);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn reschedule_rearms_for_another_firing() {
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();
        let trigger = Trigger::leaf(move || *count2.borrow_mut() += 1);

        trigger.notify(0);
        assert_eq!(*count.borrow(), 1);

        trigger.reschedule();
        trigger.notify(0);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn nested_mixed_tree_fires_when_either_branch_completes() {
        // (A && B) || (C && D)
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();
        let tree = EvalNode::Any(vec![
            EvalNode::All(vec![EvalNode::Leaf(0), EvalNode::Leaf(1)]),
            EvalNode::All(vec![EvalNode::Leaf(2), EvalNode::Leaf(3)]),
        ]);
        let trigger = Trigger::new(tree, 4, move || *count2.borrow_mut() += 1);

        trigger.notify(0);
        trigger.notify(1);
        assert_eq!(*count.borrow(), 1);
        // C and D never fire; no further callback invocation.
        trigger.notify(2);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn firing_propagates_to_dependents() {
        let dep_count = Rc::new(RefCell::new(0));
        let dep_count2 = dep_count.clone();
        let dependent = Trigger::leaf(move || *dep_count2.borrow_mut() += 1);

        let upstream = Trigger::leaf(|| {});
        upstream.add_dependent(dependent.clone(), 0);

        upstream.notify(0);
        assert_eq!(*dep_count.borrow(), 1);
    }
}
