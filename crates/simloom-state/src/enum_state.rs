//! `State<Enum>`: the current-value variant of the state machinery.

use simloom_core::{Error, Result, Scheduled, Scheduler, Tick};

use crate::enum_label::EnumLabel;
use crate::monitor::ReentrancyGuard;

/// Observable current-value state over a fieldless enum.
///
/// Observers are grouped by target value: an event registered against `v`
/// fires every time the state transitions *into* `v`, regardless of where
/// it transitioned from.
pub struct EnumState<E: EnumLabel, Ev: Scheduled = simloom_core::Event> {
    current: E,
    last_transition: Tick,
    construction_tick: Tick,
    observers: Vec<Vec<Ev>>,
    monitors: Vec<Box<dyn FnMut(E, E)>>,
    guard: ReentrancyGuard,
}

impl<E: EnumLabel, Ev: Scheduled> EnumState<E, Ev> {
    pub fn new(initial: E, construction_tick: Tick) -> Self {
        Self {
            current: initial,
            last_transition: construction_tick,
            construction_tick,
            observers: (0..E::COUNT).map(|_| Vec::new()).collect(),
            monitors: Vec::new(),
            guard: ReentrancyGuard::new(),
        }
    }

    pub fn get(&self) -> E {
        self.current
    }

    pub fn last_transition(&self) -> Tick {
        self.last_transition
    }

    pub fn construction_tick(&self) -> Tick {
        self.construction_tick
    }

    /// Transition to `v`: runs monitors synchronously, then schedules every
    /// observer registered for `v` at delay 0 in its own declared phase.
    pub fn set(&mut self, scheduler: &mut Scheduler, v: E) -> Result<()> {
        self.transition(scheduler, v, true)
    }

    /// Transition to `v` without scheduling observers. Used during
    /// teardown-before-restart when the observer chain should not see a
    /// phantom transition.
    pub fn reset(&mut self, scheduler: &mut Scheduler, v: E) -> Result<()> {
        self.transition(scheduler, v, false)
    }

    fn transition(&mut self, scheduler: &mut Scheduler, v: E, notify: bool) -> Result<()> {
        self.guard.enter()?;

        let old = self.current;
        self.current = v;
        self.last_transition = scheduler.current_tick();

        let mut monitors = std::mem::take(&mut self.monitors);
        for monitor in monitors.iter_mut() {
            monitor(old, v);
        }
        self.monitors = monitors;

        self.guard.exit();

        if notify {
            let targets = self.observers[v.index()].clone();
            for ev in targets {
                ev.schedule(scheduler, 0)?;
            }
        }

        Ok(())
    }

    /// Register `event` to fire on every future transition into `target`.
    ///
    /// # Errors
    /// Returns [`Error::ReentrantModification`] if called from within a
    /// monitor callback.
    pub fn observe(&mut self, target: E, event: Ev) -> Result<()> {
        self.guard.reject_if_in_monitor("observe")?;
        self.observers[target.index()].push(event);
        Ok(())
    }

    /// Remove a previously-registered observer for `target`.
    ///
    /// # Errors
    /// Returns [`Error::ReentrantModification`] if called from within a
    /// monitor callback.
    pub fn withdraw(&mut self, target: E, event: Ev) -> Result<()> {
        self.guard.reject_if_in_monitor("withdraw")?;
        let id = event.id();
        self.observers[target.index()].retain(|e| e.id() != id);
        Ok(())
    }

    /// Attach a monitor, returning a handle for later [`detach_monitor`].
    ///
    /// [`detach_monitor`]: EnumState::detach_monitor
    pub fn attach_monitor(&mut self, monitor: impl FnMut(E, E) + 'static) -> MonitorHandle {
        self.monitors.push(Box::new(monitor));
        MonitorHandle(self.monitors.len() - 1)
    }

    pub fn detach_monitor(&mut self, handle: MonitorHandle) {
        if handle.0 < self.monitors.len() {
            self.monitors.remove(handle.0);
        }
    }
}

/// A handle to a monitor attached to an [`EnumState`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MonitorHandle(usize);

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use simloom_core::{Event, SchedulingPhase};

    use super::*;

    crate::enum_state! {
        pub enum OpState {
            Init,
            Ready,
            Done,
        }
    }

    #[test]
    fn observer_fires_on_transition_into_target() {
        let mut scheduler = Scheduler::new();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();

        let ready_event = Event::register(&mut scheduler, "ready", SchedulingPhase::Tick, move |_s| {
            *fired2.borrow_mut() += 1;
        })
        .unwrap();

        scheduler.finalize().unwrap();

        let mut state = EnumState::<OpState>::new(OpState::Init, scheduler.current_tick());
        state.observe(OpState::Ready, ready_event).unwrap();

        state.set(&mut scheduler, OpState::Ready).unwrap();
        scheduler.run(1, false).unwrap();

        assert_eq!(*fired.borrow(), 1);
        assert_eq!(state.get(), OpState::Ready);
    }

    #[test]
    fn reset_suppresses_observer_firing() {
        let mut scheduler = Scheduler::new();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();

        let ready_event = Event::register(&mut scheduler, "ready", SchedulingPhase::Tick, move |_s| {
            *fired2.borrow_mut() += 1;
        })
        .unwrap();

        scheduler.finalize().unwrap();

        let mut state = EnumState::<OpState>::new(OpState::Init, scheduler.current_tick());
        state.observe(OpState::Ready, ready_event).unwrap();

        state.reset(&mut scheduler, OpState::Ready).unwrap();
        scheduler.run(1, false).unwrap();

        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn monitor_sees_every_transition_in_order() {
        let mut scheduler = Scheduler::new();
        scheduler.finalize().unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();

        let mut state = EnumState::<OpState>::new(OpState::Init, 0);
        state.attach_monitor(move |old, new| log2.borrow_mut().push((old, new)));

        state.set(&mut scheduler, OpState::Ready).unwrap();
        state.set(&mut scheduler, OpState::Done).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![(OpState::Init, OpState::Ready), (OpState::Ready, OpState::Done)]
        );
    }

    #[test]
    fn monitor_may_reentrantly_set_a_different_state_one_level_deep() {
        let mut scheduler = Scheduler::new();
        scheduler.finalize().unwrap();

        let inner = Rc::new(RefCell::new(EnumState::<OpState>::new(OpState::Init, 0)));
        let inner_for_monitor = inner.clone();

        let mut outer = EnumState::<OpState>::new(OpState::Init, 0);
        outer.attach_monitor(move |_old, new| {
            if new == OpState::Ready {
                // Reentrant one-level-deep set on a different state.
                let mut scheduler = Scheduler::new();
                scheduler.finalize().unwrap();
                inner_for_monitor
                    .borrow_mut()
                    .set(&mut scheduler, OpState::Ready)
                    .unwrap();
            }
        });

        outer.set(&mut scheduler, OpState::Ready).unwrap();
        assert_eq!(inner.borrow().get(), OpState::Ready);
    }
}
