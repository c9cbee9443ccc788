//! `Mirror`: a passive source that re-exposes one or more concrete sources
//! discovered by name at bind time.

use std::cell::RefCell;
use std::rc::Rc;

use simloom_core::Result;

use crate::registry::NotificationRegistry;
use crate::source::NotificationSource;

/// A facade over a set of concrete [`NotificationSource`]s, resolved by name
/// against a [`NotificationRegistry`] at construction time.
///
/// Registering on a `Mirror` registers the same handler on every bound
/// target, so the caller sees a merged stream without needing to know how
/// many underlying sources back the public name.
pub struct Mirror<T> {
    targets: Vec<Rc<RefCell<NotificationSource<T>>>>,
}

impl<T: 'static> Mirror<T> {
    /// Resolve every name in `names` against `registry`.
    ///
    /// # Errors
    /// Returns [`simloom_core::Error::UnknownName`] if any name is not
    /// registered for type `T`.
    pub fn bind(registry: &NotificationRegistry, names: &[&str]) -> Result<Self> {
        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            let source = registry.lookup::<T>(name).ok_or_else(|| {
                simloom_core::Error::UnknownName(format!(
                    "no notification source named '{name}' is registered"
                ))
            })?;
            targets.push(source);
        }
        Ok(Self { targets })
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Register `handler` on every bound target. The same handler instance
    /// runs once per post on whichever target posted it.
    pub fn register_for_notification(&self, handler: impl FnMut(&T) + 'static) {
        let shared = Rc::new(RefCell::new(handler));
        for target in &self.targets {
            let shared = shared.clone();
            target
                .borrow_mut()
                .register_for_notification(move |payload| (shared.borrow_mut())(payload))
                .expect("mirror targets are resolved fresh and never mid-observation-callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn forwards_posts_from_any_bound_target() {
        let mut registry = NotificationRegistry::new();
        let a = Rc::new(RefCell::new(NotificationSource::<u32>::new("portA").unwrap()));
        let b = Rc::new(RefCell::new(NotificationSource::<u32>::new("portB").unwrap()));
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        let mirror = Mirror::<u32>::bind(&registry, &["portA", "portB"]).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        mirror.register_for_notification(move |v| seen2.borrow_mut().push(*v));

        a.borrow_mut().post_notification(&1);
        b.borrow_mut().post_notification(&2);

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn bind_fails_on_unknown_name() {
        let registry = NotificationRegistry::new();
        assert!(Mirror::<u32>::bind(&registry, &["missing"]).is_err());
    }
}
