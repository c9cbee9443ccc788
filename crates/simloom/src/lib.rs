//! `simloom` is the core of a discrete-event simulation framework for
//! cycle-accurate microarchitecture models: a single-threaded cooperative
//! tick scheduler, observable state variables with automatic notification
//! propagation, and a trigger expression engine that compiles textual
//! expressions over counters, clocks, statistics, and notifications into
//! composite boolean predicates.
//!
//! This crate is a thin facade: the actual implementation lives in
//! `simloom-clock`, `simloom-core`, `simloom-state`, `simloom-notify`, and
//! `simloom-trigger`, each independently versioned. A simulation host
//! depends on `simloom` alone and gets the whole public surface in one
//! place.
//!
//! The device tree / parameter-configuration layer, the command-line
//! front-end, report rendering, and any concrete CPU model built on top of
//! this core are out of scope for this crate; it exposes only the
//! interfaces those layers consume.

#[doc(inline)]
pub use simloom_clock::{ClockDomain, ClockError, Tick};

#[doc(inline)]
pub use simloom_core::{
    AsyncEvent, Error, Event, PayloadEvent, PayloadHandle, Result, ScheduleableId,
    ScheduleableInfo, ScheduleableSpec, Scheduled, Scheduler, SchedulerConfig, SchedulingPhase,
    StartupEvent, UniqueEvent,
};

#[doc(inline)]
pub use simloom_state::{
    enum_state, BoolState, BoundedValue, EnumLabel, EnumState, FirstLast, MarkerHandle,
    MarkerState, MonitorHandle, OnOutOfBounds,
};

#[doc(inline)]
pub use simloom_notify::{
    Mirror, NodeObserverHandle, NotificationRegistry, NotificationSource, NotifyNode,
    ObserverHandle,
};

#[doc(inline)]
pub use simloom_trigger::{
    build_trigger, parse, tokenize, Comparator, Counter, CounterTable, CycleTrigger, Expr,
    LeafSpec, StatRegistry, TagEvent, TimeTrigger, Token, Trigger, TriggerContext, TriggerManager,
    TriggerRegistration,
};

/// The optional state-residency tracker: recycled per-value tick-count
/// accumulators for `State<Enum>` instances, flushed to a plain-text
/// histogram on teardown.
///
/// Gated behind the `residency` feature so a host that never opts in pays
/// nothing for it, not even the `anymap3`/`slab` dependency.
#[cfg(feature = "residency")]
pub mod residency {
    pub use simloom_residency::{ResidencyTracker, ResidencyTrackerPool};
}
