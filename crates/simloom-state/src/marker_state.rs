//! `State<Enum, void, N>`: a per-value marker count with threshold-crossing
//! observers — the readiness-counting pattern ("ready count >= 3").

use std::marker::PhantomData;

use simloom_core::{Result, Scheduled, Scheduler};

use crate::enum_label::EnumLabel;

/// A handle returned by [`MarkerState::new_marker`], bound to one enum
/// value. Cheap to copy; carries no borrow on the owning `MarkerState`, in
/// keeping with this crate's handle-into-arena style.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MarkerHandle<E> {
    value: E,
}

impl<E: Copy> MarkerHandle<E> {
    pub fn value(&self) -> E {
        self.value
    }
}

/// Per-enum-value mark counters with a configurable firing threshold.
///
/// Crossing the threshold upward (strictly increasing past it) schedules
/// every observer registered for that value; crossing back downward never
/// un-fires them. This lets a host express composite readiness as a count
/// ("all three operands ready" ≡ "ready count >= 3") instead of as a
/// separate boolean per dependency.
pub struct MarkerState<E: EnumLabel, Ev: Scheduled = simloom_core::Event> {
    counts: Vec<u32>,
    thresholds: Vec<u32>,
    observers: Vec<Vec<Ev>>,
    _marker: PhantomData<E>,
}

impl<E: EnumLabel, Ev: Scheduled> MarkerState<E, Ev> {
    pub fn new() -> Self {
        Self {
            counts: vec![0; E::COUNT],
            thresholds: vec![1; E::COUNT],
            observers: (0..E::COUNT).map(|_| Vec::new()).collect(),
            _marker: PhantomData,
        }
    }

    pub fn new_marker(&self, value: E) -> MarkerHandle<E> {
        MarkerHandle { value }
    }

    pub fn num_marks(&self, v: E) -> u32 {
        self.counts[v.index()]
    }

    pub fn threshold(&self, v: E) -> u32 {
        self.thresholds[v.index()]
    }

    pub fn set_marked_threshold(&mut self, v: E, n: u32) {
        self.thresholds[v.index()] = n.max(1);
    }

    pub fn is_set(&self, v: E) -> bool {
        self.counts[v.index()] >= self.thresholds[v.index()]
    }

    pub fn is_clear(&self, v: E) -> bool {
        !self.is_set(v)
    }

    /// Increment the mark count for `handle`'s value. If this crosses the
    /// value's threshold upward, schedules every observer registered for
    /// it.
    pub fn mark_set(&mut self, scheduler: &mut Scheduler, handle: MarkerHandle<E>) -> Result<()> {
        let idx = handle.value.index();
        let threshold = self.thresholds[idx];
        let was_set = self.counts[idx] >= threshold;
        self.counts[idx] += 1;
        let is_set = self.counts[idx] >= threshold;

        if is_set && !was_set {
            let targets = self.observers[idx].clone();
            for ev in targets {
                ev.schedule(scheduler, 0)?;
            }
        }

        Ok(())
    }

    /// Decrement the mark count for `handle`'s value. Never schedules
    /// observers, even if this crosses the threshold downward.
    pub fn mark_clear(&mut self, handle: MarkerHandle<E>) {
        let idx = handle.value.index();
        self.counts[idx] = self.counts[idx].saturating_sub(1);
    }

    pub fn observe(&mut self, v: E, event: Ev) {
        self.observers[v.index()].push(event);
    }

    pub fn withdraw(&mut self, v: E, event: Ev) {
        let id = event.id();
        self.observers[v.index()].retain(|e| e.id() != id);
    }
}

impl<E: EnumLabel, Ev: Scheduled> Default for MarkerState<E, Ev> {
    fn default() -> Self {
        Self::new()
    }
}
