//! `State<bool>`: up to 32 independently observable flags.

use simloom_core::{Error, Result, Scheduled, Scheduler};

use crate::monitor::ReentrancyGuard;

const MAX_FLAGS: u32 = 32;

/// A bank of up to 32 boolean flags, each with its own observer lists for
/// the `true` and `false` transitions.
pub struct BoolState<Ev: Scheduled = simloom_core::Event> {
    flags: u32,
    on_true: Vec<Vec<Ev>>,
    on_false: Vec<Vec<Ev>>,
    monitors: Vec<Box<dyn FnMut(u32, bool, bool)>>,
    guard: ReentrancyGuard,
}

impl<Ev: Scheduled> BoolState<Ev> {
    pub fn new() -> Self {
        Self {
            flags: 0,
            on_true: (0..MAX_FLAGS).map(|_| Vec::new()).collect(),
            on_false: (0..MAX_FLAGS).map(|_| Vec::new()).collect(),
            monitors: Vec::new(),
            guard: ReentrancyGuard::new(),
        }
    }

    fn check_flag(flag: u32) -> Result<()> {
        if flag >= MAX_FLAGS {
            return Err(Error::Bounds(format!(
                "flag index {flag} out of range, BoolState holds at most {MAX_FLAGS} flags"
            )));
        }
        Ok(())
    }

    pub fn get(&self, flag: u32) -> Result<bool> {
        Self::check_flag(flag)?;
        Ok(self.flags & (1 << flag) != 0)
    }

    /// Set `flag` to `value`. No-op (no monitors or observers fire) if the
    /// flag already holds `value`.
    pub fn set(&mut self, scheduler: &mut Scheduler, flag: u32, value: bool) -> Result<()> {
        Self::check_flag(flag)?;
        self.guard.enter()?;

        let old = self.flags & (1 << flag) != 0;
        let changed = old != value;
        if changed {
            if value {
                self.flags |= 1 << flag;
            } else {
                self.flags &= !(1 << flag);
            }
        }

        if changed {
            let mut monitors = std::mem::take(&mut self.monitors);
            for monitor in monitors.iter_mut() {
                monitor(flag, old, value);
            }
            self.monitors = monitors;
        }

        self.guard.exit();

        if changed {
            let targets = if value {
                self.on_true[flag as usize].clone()
            } else {
                self.on_false[flag as usize].clone()
            };
            for ev in targets {
                ev.schedule(scheduler, 0)?;
            }
        }

        Ok(())
    }

    /// Register `event` to fire the next time `flag` transitions to
    /// `value`.
    pub fn observe(&mut self, flag: u32, value: bool, event: Ev) -> Result<()> {
        Self::check_flag(flag)?;
        self.guard.reject_if_in_monitor("observe")?;
        if value {
            self.on_true[flag as usize].push(event);
        } else {
            self.on_false[flag as usize].push(event);
        }
        Ok(())
    }

    pub fn withdraw(&mut self, flag: u32, value: bool, event: Ev) -> Result<()> {
        Self::check_flag(flag)?;
        self.guard.reject_if_in_monitor("withdraw")?;
        let id = event.id();
        let list = if value {
            &mut self.on_true[flag as usize]
        } else {
            &mut self.on_false[flag as usize]
        };
        list.retain(|e| e.id() != id);
        Ok(())
    }

    pub fn attach_monitor(&mut self, monitor: impl FnMut(u32, bool, bool) + 'static) -> usize {
        self.monitors.push(Box::new(monitor));
        self.monitors.len() - 1
    }

    pub fn detach_monitor(&mut self, handle: usize) {
        if handle < self.monitors.len() {
            self.monitors.remove(handle);
        }
    }
}

impl<Ev: Scheduled> Default for BoolState<Ev> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use simloom_core::{Event, SchedulingPhase};

    use super::*;

    #[test]
    fn observer_fires_only_on_actual_transition() {
        let mut scheduler = Scheduler::new();
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();

        let ev = Event::register(&mut scheduler, "flag-on", SchedulingPhase::Tick, move |_s| {
            *count2.borrow_mut() += 1;
        })
        .unwrap();
        scheduler.finalize().unwrap();

        let mut flags = BoolState::new();
        flags.observe(3, true, ev).unwrap();

        flags.set(&mut scheduler, 3, true).unwrap();
        // Setting to the same value again must not re-fire.
        flags.set(&mut scheduler, 3, true).unwrap();
        scheduler.run(1, false).unwrap();

        assert_eq!(*count.borrow(), 1);
        assert!(flags.get(3).unwrap());
    }

    #[test]
    fn out_of_range_flag_is_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.finalize().unwrap();
        let mut flags = BoolState::<Event>::new();
        assert!(matches!(
            flags.set(&mut scheduler, 32, true),
            Err(Error::Bounds(_))
        ));
    }
}
