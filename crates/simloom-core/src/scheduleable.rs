//! The abstract unit of work the [`Scheduler`](crate::Scheduler) dispatches.

use simloom_clock::ClockDomain;

use crate::phase::SchedulingPhase;

/// A stable handle to a registered [`Scheduleable`](crate::Scheduler::register).
///
/// Handles are never invalidated: a `Scheduleable` is destroyed only when the
/// owning `Scheduler` itself is dropped (spec'd lifecycle: "created during
/// setup ... destroyed only during global teardown"). Cloning, copying, and
/// comparing handles is cheap and does not touch the scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScheduleableId(pub(crate) usize);

impl ScheduleableId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Declarative description of a `Scheduleable`, supplied to
/// [`Scheduler::register`](crate::Scheduler::register).
#[derive(Clone, Debug)]
pub struct ScheduleableSpec {
    /// Debug label, surfaced in error messages and tracing spans.
    pub label: String,
    /// The phase this scheduleable always runs in.
    pub phase: SchedulingPhase,
    /// The clock domain this scheduleable is associated with. `None` means
    /// the root clock.
    pub clock: Option<ClockDomain>,
    /// If true, a pending instance of this scheduleable keeps the scheduler
    /// out of quiescence.
    pub continuing: bool,
    /// Optional secondary sort key used to break ties among scheduleables
    /// that carry no precedence relationship in the same phase. Lower values
    /// sort first. Scheduleables with no tag fall back to registration order.
    pub order_tag: Option<u64>,
    /// If true, this scheduleable dedups within a single `(tick, phase)`:
    /// repeated scheduling collapses to a single firing. Backs
    /// [`UniqueEvent`](crate::UniqueEvent).
    pub unique: bool,
}

impl ScheduleableSpec {
    /// A plain, non-unique scheduleable in the given phase, not continuing.
    pub fn new(label: impl Into<String>, phase: SchedulingPhase) -> Self {
        Self {
            label: label.into(),
            phase,
            clock: None,
            continuing: false,
            order_tag: None,
            unique: false,
        }
    }

    pub fn with_clock(mut self, clock: ClockDomain) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn continuing(mut self, continuing: bool) -> Self {
        self.continuing = continuing;
        self
    }

    pub fn order_tag(mut self, tag: u64) -> Self {
        self.order_tag = Some(tag);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Read-only view of a registered scheduleable's static attributes.
#[derive(Clone, Debug)]
pub struct ScheduleableInfo {
    pub label: String,
    pub phase: SchedulingPhase,
    pub clock: Option<ClockDomain>,
    pub continuing: bool,
    pub order_tag: Option<u64>,
    pub unique: bool,
    pub(crate) registration_seq: u64,
}
