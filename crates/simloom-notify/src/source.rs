//! `NotificationSource<T>`: a single named node in the notification tree.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use simloom_core::{Error, Result};

use crate::name::validate_name;
use crate::node::{current_generation, NodeObserverHandle, NotifyNode};

/// A stable handle to a registered observer, needed to deregister it later.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ObserverHandle(u64);

/// A named, hierarchically-propagated pub/sub channel carrying payloads of
/// type `T`.
///
/// Every source occupies one [`NotifyNode`]. Delegates fire synchronously,
/// in registration order, inside
/// [`post_notification`](NotificationSource::post_notification): this
/// includes observers registered directly on this source (via
/// [`register_for_notification`](NotificationSource::register_for_notification))
/// as well as observers registered on any ancestor node (via
/// [`NotifyNode::observe`]) with a name filter matching this source, and the
/// shared [`NotifyNode::virtual_root`]. This is a plain synchronous callback
/// fan-out, distinct from [`simloom_state`](../simloom_state/index.html)'s
/// state-transition observers, which are scheduled through the tick
/// scheduler instead of run inline.
pub struct NotificationSource<T> {
    name: String,
    node: Rc<NotifyNode>,
    own_observer_ids: Vec<u64>,
    cache: Vec<Rc<RefCell<Box<dyn FnMut(&T)>>>>,
    cache_generation: Option<u64>,
    observation_state: Option<Box<dyn FnMut(bool)>>,
    in_observation_callback: Cell<bool>,
}

impl<T: 'static> NotificationSource<T> {
    /// Create a new, parentless source. Its ancestor walk still reaches the
    /// shared [`NotifyNode::virtual_root`].
    ///
    /// `name` must satisfy the grammar in §6 (`[A-Za-z][A-Za-z0-9_]*`, no
    /// adjacent underscores, no reserved-word collision).
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_node(name, NotifyNode::root())
    }

    /// Create a source whose node is a child of `parent`, so observers
    /// registered on `parent` (or any of *its* ancestors) with a matching
    /// name filter see this source's postings.
    pub fn child(name: impl Into<String>, parent: &Rc<NotifyNode>) -> Result<Self> {
        Self::with_node(name, NotifyNode::child(parent))
    }

    fn with_node(name: impl Into<String>, node: Rc<NotifyNode>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            node,
            own_observer_ids: Vec::new(),
            cache: Vec::new(),
            cache_generation: None,
            observation_state: None,
            in_observation_callback: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This source's position in the notification tree. Pass this to
    /// [`NotifyNode::child`] to attach a descendant source, or to
    /// [`NotifyNode::observe`] to register an ancestor-level observer whose
    /// name filter matches this source.
    pub fn node(&self) -> &Rc<NotifyNode> {
        &self.node
    }

    /// Number of observers registered directly on this source via
    /// [`register_for_notification`](Self::register_for_notification).
    /// Does not count observers registered on an ancestor node.
    pub fn observer_count(&self) -> usize {
        self.own_observer_ids.len()
    }

    /// Synchronously invoke every delegate whose registration resolves to
    /// this source — its own direct observers plus every ancestor (and the
    /// virtual root) registered with a matching name filter — in the order
    /// produced by walking from this node up to the root. A delegate that
    /// panics propagates; no attempt is made to shield later delegates from
    /// an earlier one's panic.
    pub fn post_notification(&mut self, payload: &T) {
        self.refresh_cache();
        for delegate in &self.cache {
            (delegate.borrow_mut())(payload);
        }
    }

    fn refresh_cache(&mut self) {
        let generation = current_generation();
        if self.cache_generation != Some(generation) {
            self.cache = self.resolve_delegates();
            self.cache_generation = Some(generation);
        }
    }

    /// Walk from this source's own node up through every ancestor, then the
    /// virtual root, collecting every `T`-typed observer whose name filter
    /// matches this source's name (or has none).
    fn resolve_delegates(&self) -> Vec<Rc<RefCell<Box<dyn FnMut(&T)>>>> {
        let mut delegates = Vec::new();
        let mut current = Some(self.node.clone());
        while let Some(node) = current {
            delegates.extend(node.matching_delegates::<T>(&self.name));
            current = node.parent().cloned();
        }

        let virtual_root = NotifyNode::virtual_root();
        if !Rc::ptr_eq(&virtual_root, &self.node) {
            delegates.extend(virtual_root.matching_delegates::<T>(&self.name));
        }

        delegates
    }

    /// Register `handler` to run on every future `post_notification` call
    /// on this exact source.
    ///
    /// # Errors
    /// Returns [`Error::ReentrantModification`] if called from within the
    /// observation-state callback.
    pub fn register_for_notification(
        &mut self,
        handler: impl FnMut(&T) + 'static,
    ) -> Result<ObserverHandle> {
        if self.in_observation_callback.get() {
            return Err(Error::ReentrantModification(
                "cannot register an observer from within the observation-state callback".into(),
            ));
        }

        let was_empty = self.own_observer_ids.is_empty();
        let handle = self.node.observe::<T>(None, handler);
        self.own_observer_ids.push(handle.0);

        if was_empty {
            self.fire_observation_state(true);
        }

        Ok(ObserverHandle(handle.0))
    }

    /// # Errors
    /// Returns [`Error::ReentrantModification`] if called from within the
    /// observation-state callback.
    pub fn deregister_for_notification(&mut self, handle: ObserverHandle) -> Result<()> {
        if self.in_observation_callback.get() {
            return Err(Error::ReentrantModification(
                "cannot deregister an observer from within the observation-state callback".into(),
            ));
        }

        let before = self.own_observer_ids.len();
        self.own_observer_ids.retain(|id| *id != handle.0);
        let removed = before != self.own_observer_ids.len();

        if removed {
            self.node.stop_observing(NodeObserverHandle(handle.0));
        }

        if removed && self.own_observer_ids.is_empty() {
            self.fire_observation_state(false);
        }

        Ok(())
    }

    /// Install a callback invoked when the observer count transitions
    /// between zero and nonzero: `true` on first-observer-added, `false` on
    /// last-observer-removed. Only counts observers registered directly on
    /// this source, not on an ancestor.
    pub fn set_observation_state_callback(&mut self, callback: impl FnMut(bool) + 'static) {
        self.observation_state = Some(Box::new(callback));
    }

    fn fire_observation_state(&mut self, has_observers: bool) {
        if let Some(mut callback) = self.observation_state.take() {
            self.in_observation_callback.set(true);
            callback(has_observers);
            self.in_observation_callback.set(false);
            self.observation_state = Some(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn observers_fire_in_registration_order_with_shared_payload() {
        let mut source = NotificationSource::<u32>::new("portA").unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = log.clone();
        source.register_for_notification(move |v| log1.borrow_mut().push(("first", *v))).unwrap();
        let log2 = log.clone();
        source.register_for_notification(move |v| log2.borrow_mut().push(("second", *v))).unwrap();

        source.post_notification(&42);

        assert_eq!(*log.borrow(), vec![("first", 42), ("second", 42)]);
    }

    #[test]
    fn deregister_stops_future_delivery() {
        let mut source = NotificationSource::<u32>::new("portA").unwrap();
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();

        let handle = source
            .register_for_notification(move |_v| *count2.borrow_mut() += 1)
            .unwrap();
        source.post_notification(&1);
        source.deregister_for_notification(handle).unwrap();
        source.post_notification(&2);

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn observation_state_callback_sees_edges_only() {
        let mut source = NotificationSource::<u32>::new("portA").unwrap();
        let edges = Rc::new(RefCell::new(Vec::new()));
        let edges2 = edges.clone();
        source.set_observation_state_callback(move |has| edges2.borrow_mut().push(has));

        let h1 = source.register_for_notification(|_| {}).unwrap();
        let h2 = source.register_for_notification(|_| {}).unwrap();
        source.deregister_for_notification(h1).unwrap();
        source.deregister_for_notification(h2).unwrap();

        assert_eq!(*edges.borrow(), vec![true, false]);
    }

    #[test]
    fn rejects_malformed_name() {
        assert!(NotificationSource::<u32>::new("_bad").is_err());
    }

    /// An observer registered on a source's parent node, filtered by name,
    /// transparently sees notifications posted by that descendant source —
    /// the core hierarchical invariant: ancestors observe without the
    /// source needing to know who is watching or from where.
    #[test]
    fn ancestor_registration_observes_descendant_postings() {
        let root = NotifyNode::root();
        let mut leaf = NotificationSource::<u32>::child("leaf", &root).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        root.observe::<u32>(Some("leaf"), move |v| seen2.borrow_mut().push(*v));

        leaf.post_notification(&7);
        assert_eq!(*seen.borrow(), vec![7]);
    }

    /// A name filter on the ancestor registration must only match the
    /// descendant it names, not every child of that ancestor.
    #[test]
    fn ancestor_registration_does_not_leak_across_siblings() {
        let root = NotifyNode::root();
        let mut a = NotificationSource::<u32>::child("a", &root).unwrap();
        let mut b = NotificationSource::<u32>::child("b", &root).unwrap();

        let b_hits = Rc::new(RefCell::new(0));
        let b_hits2 = b_hits.clone();
        root.observe::<u32>(Some("b"), move |_| *b_hits2.borrow_mut() += 1);

        a.post_notification(&1);
        assert_eq!(*b_hits.borrow(), 0);
        b.post_notification(&2);
        assert_eq!(*b_hits.borrow(), 1);
    }

    /// Propagation climbs an arbitrary number of ancestors, not just the
    /// immediate parent.
    #[test]
    fn grandparent_registration_observes_multi_level_descendant() {
        let root = NotifyNode::root();
        let mid = NotifyNode::child(&root);
        let mut leaf = NotificationSource::<u32>::child("leaf", &mid).unwrap();

        let hits = Rc::new(RefCell::new(0));
        let hits2 = hits.clone();
        root.observe::<u32>(Some("leaf"), move |_| *hits2.borrow_mut() += 1);

        leaf.post_notification(&1);
        assert_eq!(*hits.borrow(), 1);
    }

    /// Registering directly on a source and on one of its ancestors both
    /// fire, in the order the delegate-cache walk visits them (own node
    /// first, then each ancestor).
    #[test]
    fn own_and_ancestor_observers_both_fire() {
        let root = NotifyNode::root();
        let mut leaf = NotificationSource::<u32>::child("leaf", &root).unwrap();

        let order = Rc::new(RefCell::new(Vec::new()));
        let order1 = order.clone();
        leaf.register_for_notification(move |_| order1.borrow_mut().push("own")).unwrap();
        let order2 = order.clone();
        root.observe::<u32>(Some("leaf"), move |_| order2.borrow_mut().push("ancestor"));

        leaf.post_notification(&1);
        assert_eq!(*order.borrow(), vec!["own", "ancestor"]);
    }

    /// Adding an ancestor observer after earlier postings still takes
    /// effect: the delegate cache rebuilds once the generation counter
    /// moves, rather than freezing at first-post state.
    #[test]
    fn cache_picks_up_observers_registered_after_earlier_posts() {
        let root = NotifyNode::root();
        let mut leaf = NotificationSource::<u32>::child("leaf", &root).unwrap();

        leaf.post_notification(&1);

        let hits = Rc::new(RefCell::new(0));
        let hits2 = hits.clone();
        root.observe::<u32>(Some("leaf"), move |_| *hits2.borrow_mut() += 1);

        leaf.post_notification(&2);
        assert_eq!(*hits.borrow(), 1);
    }
}
