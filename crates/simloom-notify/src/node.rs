//! `NotifyNode`: a position in the notification-source tree.
//!
//! Mirrors the distilled framework's `TreeNode`: every [`NotificationSource`](
//! crate::NotificationSource) occupies one `NotifyNode`, linked to its
//! parent's. An observer may register directly on a node — matching only
//! postings from a source sitting exactly at that node — or on an ancestor
//! with a name filter, matching any descendant source of that name. A
//! source resolves its full, cached delegate list lazily by walking from its
//! own node up through every ancestor, finally checking the shared
//! [`NotifyNode::virtual_root`].
//!
//! Ascending and re-checking on every post would work but wastes cycles on
//! a tree that rarely changes shape; instead each node's registration
//! change bumps one thread-local generation counter, and a source only
//! re-walks its ancestors when that counter has moved since its last post.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

thread_local! {
    static GENERATION: Cell<u64> = Cell::new(0);
}

fn bump_generation() {
    GENERATION.with(|g| g.set(g.get() + 1));
}

pub(crate) fn current_generation() -> u64 {
    GENERATION.with(|g| g.get())
}

/// A handle to an observer registered directly on a [`NotifyNode`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeObserverHandle(pub(crate) u64);

struct LocalObserver {
    id: u64,
    type_id: TypeId,
    name_filter: Option<String>,
    handler: Rc<dyn Any>,
}

/// A node in the notification-source tree.
///
/// Every [`NotificationSource`](crate::NotificationSource) owns one
/// `NotifyNode` marking its position; ancestors and the source's own node
/// are the only places an observer can register.
pub struct NotifyNode {
    parent: Option<Rc<NotifyNode>>,
    local_observers: RefCell<Vec<LocalObserver>>,
    next_id: Cell<u64>,
}

thread_local! {
    static VIRTUAL_ROOT: Rc<NotifyNode> = Rc::new(NotifyNode {
        parent: None,
        local_observers: RefCell::new(Vec::new()),
        next_id: Cell::new(0),
    });
}

impl NotifyNode {
    /// The shared node every ancestor walk falls back to past the top of
    /// its own explicit parent chain, matching the source framework's
    /// "virtual global node": a registration here observes any descendant
    /// source anywhere in the tree that matches by name.
    pub fn virtual_root() -> Rc<NotifyNode> {
        VIRTUAL_ROOT.with(Rc::clone)
    }

    /// Create a detached root node with no parent.
    pub fn root() -> Rc<NotifyNode> {
        Rc::new(NotifyNode {
            parent: None,
            local_observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    /// Create a node whose ancestor chain continues through `parent`.
    pub fn child(parent: &Rc<NotifyNode>) -> Rc<NotifyNode> {
        Rc::new(NotifyNode {
            parent: Some(parent.clone()),
            local_observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub fn parent(&self) -> Option<&Rc<NotifyNode>> {
        self.parent.as_ref()
    }

    /// Register `handler` for payload type `T` on this node.
    ///
    /// `name_filter` of `None` matches every `T`-typed source whose
    /// delegate-cache walk passes through this node — the usual case when
    /// registering directly on a source's own node. `Some(name)` restricts
    /// delivery to a descendant source named exactly `name`, the ancestor
    /// case from spec.md §3.6/§4.4.
    pub fn observe<T: 'static>(
        &self,
        name_filter: Option<&str>,
        handler: impl FnMut(&T) + 'static,
    ) -> NodeObserverHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let boxed: Rc<RefCell<Box<dyn FnMut(&T)>>> = Rc::new(RefCell::new(Box::new(handler)));
        self.local_observers.borrow_mut().push(LocalObserver {
            id,
            type_id: TypeId::of::<T>(),
            name_filter: name_filter.map(str::to_string),
            handler: boxed,
        });
        bump_generation();
        NodeObserverHandle(id)
    }

    /// Remove a previously-registered node-level observer.
    pub fn stop_observing(&self, handle: NodeObserverHandle) {
        let before = self.local_observers.borrow().len();
        self.local_observers.borrow_mut().retain(|o| o.id != handle.0);
        if self.local_observers.borrow().len() != before {
            bump_generation();
        }
    }

    pub(crate) fn matching_delegates<T: 'static>(
        &self,
        name: &str,
    ) -> Vec<Rc<RefCell<Box<dyn FnMut(&T)>>>> {
        self.local_observers
            .borrow()
            .iter()
            .filter(|o| o.type_id == TypeId::of::<T>())
            .filter(|o| o.name_filter.as_deref().map_or(true, |filter| filter == name))
            .filter_map(|o| o.handler.clone().downcast::<RefCell<Box<dyn FnMut(&T)>>>().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn observing_on_own_node_matches_any_name() {
        let node = NotifyNode::root();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        node.observe::<u32>(None, move |v| log2.borrow_mut().push(*v));

        let delegates = node.matching_delegates::<u32>("whatever");
        assert_eq!(delegates.len(), 1);
        (delegates[0].borrow_mut())(&9);
        assert_eq!(*log.borrow(), vec![9]);
    }

    #[test]
    fn observing_with_name_filter_only_matches_that_name() {
        let node = NotifyNode::root();
        node.observe::<u32>(Some("a"), |_| {});

        assert_eq!(node.matching_delegates::<u32>("a").len(), 1);
        assert_eq!(node.matching_delegates::<u32>("b").len(), 0);
    }

    #[test]
    fn stop_observing_removes_the_handle() {
        let node = NotifyNode::root();
        let handle = node.observe::<u32>(None, |_| {});
        assert_eq!(node.matching_delegates::<u32>("x").len(), 1);

        node.stop_observing(handle);
        assert_eq!(node.matching_delegates::<u32>("x").len(), 0);
    }

    #[test]
    fn type_mismatch_never_matches() {
        let node = NotifyNode::root();
        node.observe::<u32>(None, |_| {});
        assert_eq!(node.matching_delegates::<bool>("x").len(), 0);
    }
}
