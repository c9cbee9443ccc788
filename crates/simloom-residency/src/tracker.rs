//! Per-instance residency accumulator.
//!
//! A [`ResidencyTracker`] is never constructed directly; it is handed out
//! by [`crate::ResidencyTrackerPool::acquire`] and returns its slot to the
//! pool on drop. Trackers are recycled through the pool so an instance's
//! lifetime need not match its slot's allocation lifetime.

use simloom_clock::Tick;
use simloom_state::EnumLabel;

use crate::pool::TypedPool;
use std::cell::RefCell;
use std::rc::Rc;

/// One slot's worth of bookkeeping inside a [`TypedPool`]: the per-value
/// accumulated tick counts and the timestamp of the owning tracker's last
/// transition.
pub(crate) struct TrackerSlot<E: EnumLabel> {
    pub(crate) deltas: Vec<u64>,
    pub(crate) last_transition: Tick,
    pub(crate) current: E,
}

impl<E: EnumLabel> TrackerSlot<E> {
    pub(crate) fn reset(&mut self, initial: E, construction_tick: Tick) {
        for d in self.deltas.iter_mut() {
            *d = 0;
        }
        self.current = initial;
        self.last_transition = construction_tick;
    }
}

/// A lightweight per-instance residency accumulator for one `State<Enum>`.
///
/// Call [`ResidencyTracker::on_transition`] from the same call site that
/// calls `EnumState::set` (or `reset`): it adds the elapsed ticks since the
/// last transition to the slot for the *old* value, then stamps the new
/// current value and timestamp.
pub struct ResidencyTracker<E: EnumLabel> {
    pool: Rc<RefCell<TypedPool<E>>>,
    slot: usize,
}

impl<E: EnumLabel> ResidencyTracker<E> {
    pub(crate) fn new(pool: Rc<RefCell<TypedPool<E>>>, slot: usize) -> Self {
        Self { pool, slot }
    }

    /// Record that the tracked state just became `new_value` at
    /// `current_tick`, crediting the elapsed time to whichever value it was
    /// previously in.
    pub fn on_transition(&mut self, current_tick: Tick, new_value: E) {
        let mut pool = self.pool.borrow_mut();
        let entry = &mut pool.slots[self.slot];
        let idx = entry.current.index();
        entry.deltas[idx] += current_tick.saturating_sub(entry.last_transition);
        entry.last_transition = current_tick;
        entry.current = new_value;
    }

    /// Ticks accumulated so far against `value` by this tracker alone (not
    /// including time accrued by any tracker that previously occupied this
    /// slot, nor time still accruing in the currently-held value — call
    /// [`ResidencyTracker::on_transition`] first to flush that).
    pub fn ticks_in(&self, value: E) -> u64 {
        self.pool.borrow().slots[self.slot].deltas[value.index()]
    }

    pub fn current_value(&self) -> E {
        self.pool.borrow().slots[self.slot].current
    }
}

impl<E: EnumLabel> Drop for ResidencyTracker<E> {
    fn drop(&mut self) {
        self.pool.borrow_mut().release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use simloom_core::Scheduler;

    use super::*;
    use crate::ResidencyTrackerPool;

    simloom_state::enum_state! {
        pub enum OpState {
            Init,
            Ready,
            Done,
        }
    }

    #[test]
    fn accumulates_per_value_ticks_across_transitions() {
        let pool = ResidencyTrackerPool::new();
        let mut scheduler = Scheduler::new();
        scheduler.finalize().unwrap();

        let mut tracker = pool.acquire::<OpState>(OpState::Init, 0);

        scheduler.run(2, false).unwrap();
        tracker.on_transition(scheduler.current_tick(), OpState::Ready);
        assert_eq!(tracker.ticks_in(OpState::Init), 2);

        scheduler.run(5, false).unwrap();
        tracker.on_transition(scheduler.current_tick(), OpState::Done);
        assert_eq!(tracker.ticks_in(OpState::Ready), 3);
    }

    #[test]
    fn dropping_a_tracker_recycles_its_slot() {
        let pool = ResidencyTrackerPool::new();
        {
            let _tracker = pool.acquire::<OpState>(OpState::Init, 0);
            assert_eq!(pool.instance_count::<OpState>(), 1);
        }
        let _tracker2 = pool.acquire::<OpState>(OpState::Init, 0);
        // The freed slot was reused rather than a second one allocated.
        assert_eq!(pool.instance_count::<OpState>(), 1);
    }
}
