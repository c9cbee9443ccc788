//! Observable state variables: `State<Enum>`, `State<bool>`, and the
//! marker-count variant used for composite readiness.
//!
//! Every variant shares the same two-tier notification model: a small
//! in-order vector of synchronous monitors invoked inside `set`, and
//! per-target-value lists of [`simloom_core::Scheduled`] handles that the
//! owning [`simloom_core::Scheduler`] fires at their declared phase.

mod bool_state;
mod bounded;
mod enum_label;
mod enum_state;
mod marker_state;
mod monitor;

pub use bool_state::BoolState;
pub use bounded::{BoundedValue, OnOutOfBounds};
pub use enum_label::{EnumLabel, FirstLast};
pub use enum_state::{EnumState, MonitorHandle};
pub use marker_state::{MarkerHandle, MarkerState};
