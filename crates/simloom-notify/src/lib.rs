//! Hierarchical typed notification channels.
//!
//! A [`NotificationSource<T>`] is a named, synchronous pub/sub channel.
//! [`NotificationRegistry`] resolves channels by `(type, name)` for callers
//! that only know a name, and [`Mirror`] re-exposes a set of named channels
//! behind one public name.

mod mirror;
mod name;
mod node;
mod registry;
mod source;

pub use mirror::Mirror;
pub use name::validate_name;
pub use node::{NodeObserverHandle, NotifyNode};
pub use registry::NotificationRegistry;
pub use source::{NotificationSource, ObserverHandle};
