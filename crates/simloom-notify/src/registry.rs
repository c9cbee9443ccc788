//! Process-wide directory resolving `(type, name)` to a concrete
//! [`NotificationSource`], so a caller that only knows a channel's name (a
//! trigger leaf, a [`crate::Mirror`]) can reach it without holding a direct
//! reference.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use simloom_core::{Error, Result};
use tracing::debug;

use crate::source::{NotificationSource, ObserverHandle};

type Key = (TypeId, String);

/// Maps `(TypeId::of::<T>(), name)` to a shared handle on that source.
#[derive(Default)]
pub struct NotificationRegistry {
    sources: AHashMap<Key, Rc<dyn Any>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self { sources: AHashMap::default() }
    }

    /// Publish `source` under its own name for name-based lookup.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a source of the same type is
    /// already registered under that name.
    pub fn register<T: 'static>(&mut self, source: Rc<RefCell<NotificationSource<T>>>) -> Result<()> {
        let key = (TypeId::of::<T>(), source.borrow().name().to_string());
        if self.sources.contains_key(&key) {
            return Err(Error::Configuration(format!(
                "a notification source named '{}' is already registered for this type",
                key.1
            )));
        }
        debug!(name = %key.1, "registered notification source");
        self.sources.insert(key, source);
        Ok(())
    }

    pub fn lookup<T: 'static>(&self, name: &str) -> Option<Rc<RefCell<NotificationSource<T>>>> {
        let key = (TypeId::of::<T>(), name.to_string());
        self.sources
            .get(&key)
            .and_then(|source| source.clone().downcast::<RefCell<NotificationSource<T>>>().ok())
    }

    /// Resolve `name` and register `handler` against it.
    ///
    /// # Errors
    /// Returns [`Error::UnknownName`] if no source of type `T` is
    /// registered under `name`.
    pub fn register_for_notification<T: 'static>(
        &self,
        name: &str,
        handler: impl FnMut(&T) + 'static,
    ) -> Result<ObserverHandle> {
        let source = self.lookup::<T>(name).ok_or_else(|| {
            Error::UnknownName(format!("no notification source named '{name}' is registered"))
        })?;
        source.borrow_mut().register_for_notification(handler)
    }

    /// # Errors
    /// Returns [`Error::UnknownName`] if no source of type `T` is
    /// registered under `name`.
    pub fn deregister_for_notification<T: 'static>(
        &self,
        name: &str,
        handle: ObserverHandle,
    ) -> Result<()> {
        let source = self.lookup::<T>(name).ok_or_else(|| {
            Error::UnknownName(format!("no notification source named '{name}' is registered"))
        })?;
        source.borrow_mut().deregister_for_notification(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_by_name_and_type() {
        let mut registry = NotificationRegistry::new();
        let source = Rc::new(RefCell::new(NotificationSource::<u32>::new("portA").unwrap()));
        registry.register(source.clone()).unwrap();

        assert!(registry.lookup::<u32>("portA").is_some());
        assert!(registry.lookup::<u32>("portB").is_none());
        // Different payload type under the same name is a distinct entry.
        assert!(registry.lookup::<bool>("portA").is_none());
    }

    #[test]
    fn register_for_notification_delivers_via_name() {
        let mut registry = NotificationRegistry::new();
        let source = Rc::new(RefCell::new(NotificationSource::<u32>::new("portA").unwrap()));
        registry.register(source.clone()).unwrap();

        let seen = Rc::new(RefCell::new(0u32));
        let seen2 = seen.clone();
        registry
            .register_for_notification::<u32>("portA", move |v| *seen2.borrow_mut() = *v)
            .unwrap();

        source.borrow_mut().post_notification(&7);
        assert_eq!(*seen.borrow(), 7);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = NotificationRegistry::new();
        assert!(matches!(
            registry.register_for_notification::<u32>("missing", |_| {}),
            Err(Error::UnknownName(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = NotificationRegistry::new();
        let a = Rc::new(RefCell::new(NotificationSource::<u32>::new("portA").unwrap()));
        let b = Rc::new(RefCell::new(NotificationSource::<u32>::new("portA").unwrap()));
        registry.register(a).unwrap();
        assert!(registry.register(b).is_err());
    }
}
