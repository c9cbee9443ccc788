//! The process-wide tagged trigger registry.
//!
//! A borrowed-reference registry: [`TriggerManager::register`] returns a
//! guard whose `Drop` removes the entry, so a tag can never outlive the
//! trigger it names — insertions and removals are bracketed by
//! constructor/destructor.

use std::cell::RefCell;

use ahash::AHashMap;
use simloom_core::{Error, Result};

use crate::ast::TagEvent;
use crate::trigger::Trigger;

type Key = (String, TagEvent);

#[derive(Default)]
pub struct TriggerManager {
    entries: RefCell<AHashMap<Key, Trigger>>,
}

impl TriggerManager {
    pub fn new() -> Self {
        Self { entries: RefCell::new(AHashMap::default()) }
    }

    /// Publish `trigger` under `tag.event`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if that `(tag, event)` pair is
    /// already registered.
    pub fn register(&self, tag: impl Into<String>, event: TagEvent, trigger: Trigger) -> Result<TriggerRegistration<'_>> {
        let key = (tag.into(), event);
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&key) {
            return Err(Error::Configuration(format!(
                "tag '{}' is already registered for event {:?}",
                key.0, key.1
            )));
        }
        entries.insert(key.clone(), trigger);
        Ok(TriggerRegistration { manager: self, key })
    }

    pub fn lookup(&self, tag: &str, event: TagEvent) -> Option<Trigger> {
        self.entries.borrow().get(&(tag.to_string(), event)).cloned()
    }
}

/// RAII guard returned by [`TriggerManager::register`]. Dropping it
/// deregisters the tag.
pub struct TriggerRegistration<'a> {
    manager: &'a TriggerManager,
    key: Key,
}

impl Drop for TriggerRegistration<'_> {
    fn drop(&mut self) {
        self.manager.entries.borrow_mut().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_registered_tag() {
        let manager = TriggerManager::new();
        let trigger = Trigger::leaf(|| {});
        let registration = manager.register("t0", TagEvent::Start, trigger).unwrap();

        assert!(manager.lookup("t0", TagEvent::Start).is_some());
        assert!(manager.lookup("t0", TagEvent::Stop).is_none());

        drop(registration);
        assert!(manager.lookup("t0", TagEvent::Start).is_none());
    }

    #[test]
    fn duplicate_tag_registration_is_rejected() {
        let manager = TriggerManager::new();
        let _first = manager.register("t0", TagEvent::Start, Trigger::leaf(|| {})).unwrap();
        assert!(manager.register("t0", TagEvent::Start, Trigger::leaf(|| {})).is_err());
    }
}
