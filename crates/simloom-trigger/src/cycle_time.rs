//! Standalone cycle and time triggers.
//!
//! Unlike the `&&`/`||` grammar's leaves, these are constructed directly
//! from a clock/cycle pair or a time-unit string — there is no boolean
//! composition involved, just a single one-shot firing. Both are built the
//! same way under the hood: a [`simloom_core::UniqueEvent`] scheduled once,
//! whose handler calls `notify()` on the owning [`Trigger`].
//!
//! Construction must happen before [`Scheduler::finalize`] — the backing
//! `UniqueEvent` is a `Scheduleable`, and no new one may be registered
//! afterwards.

use simloom_clock::ClockDomain;
use simloom_core::{Error, Result, Scheduled, Scheduler, SchedulingPhase, UniqueEvent};

use crate::trigger::Trigger;

/// A one-shot trigger that fires when a specific clock reaches a target
/// cycle.
pub struct CycleTrigger;

impl CycleTrigger {
    /// Build a [`Trigger`] that fires the instant `clock` reaches
    /// `target_cycle`, by scheduling a `UniqueEvent` at `clock.tick_of(target_cycle)`.
    ///
    /// # Errors
    /// Propagates [`simloom_core::Error::Configuration`] if the scheduler is
    /// already finalized, or if `target_cycle`'s tick already lies in the
    /// past relative to the scheduler's current tick.
    pub fn new(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        clock: &ClockDomain,
        target_cycle: u64,
        phase: SchedulingPhase,
        callback: impl FnMut() + 'static,
    ) -> Result<Trigger> {
        let target_tick = clock.tick_of(target_cycle);
        let current_tick = scheduler.current_tick();
        if target_tick < current_tick {
            return Err(Error::Configuration(format!(
                "cycle trigger target tick {target_tick} already lies in the past \
                 (scheduler is at tick {current_tick})"
            )));
        }
        let delay = target_tick - current_tick;

        let trigger = Trigger::leaf(callback);
        let fire = trigger.clone();
        let event = UniqueEvent::register(scheduler, label, phase, move |_s| fire.notify(0))?;
        event.schedule(scheduler, delay)?;

        Ok(trigger)
    }
}

/// A one-shot trigger whose target is expressed in absolute simulated time
/// (picoseconds), resolved to a root-clock tick via floor division.
pub struct TimeTrigger;

impl TimeTrigger {
    /// Build a [`Trigger`] that fires once simulated time reaches
    /// `expression`, a string like `"1500 ns"` (accepted units: `ps`, `ns`
    /// — the default when no unit is given —, `us`, `ms`).
    ///
    /// `ps_per_tick` is the host's chosen root-clock granularity: how many
    /// picoseconds one root-clock tick represents.
    ///
    /// # Errors
    /// Returns [`simloom_core::Error::Parse`] if `expression` is malformed
    /// or resolves to a zero-picosecond target (`"0 ns"` is disallowed).
    /// Propagates [`simloom_core::Error::Configuration`] if the scheduler is
    /// already finalized.
    pub fn new(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        expression: &str,
        ps_per_tick: u64,
        phase: SchedulingPhase,
        callback: impl FnMut() + 'static,
    ) -> Result<Trigger> {
        let target_ps = parse_time_expression(expression)?;
        let target_tick = target_ps / ps_per_tick.max(1);
        let current_tick = scheduler.current_tick();
        if target_tick < current_tick {
            return Err(Error::Configuration(format!(
                "time trigger target tick {target_tick} already lies in the past \
                 (scheduler is at tick {current_tick})"
            )));
        }
        let delay = target_tick - current_tick;

        let trigger = Trigger::leaf(callback);
        let fire = trigger.clone();
        let event = UniqueEvent::register(scheduler, label, phase, move |_s| fire.notify(0))?;
        event.schedule(scheduler, delay)?;

        Ok(trigger)
    }
}

/// Parse `"<number> [unit]"` into picoseconds. No unit defaults to
/// nanoseconds. A zero target is rejected: a time trigger cannot fire
/// before the simulation starts.
fn parse_time_expression(expression: &str) -> Result<u64> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    let (value_str, exponent) = match parts.as_slice() {
        [value] => (*value, 3u32),
        [value, unit] => {
            let exponent = match *unit {
                "ps" => 0,
                "ns" => 3,
                "us" => 6,
                "ms" => 9,
                other => {
                    return Err(Error::Parse(format!(
                        "unrecognized time unit '{other}' in time trigger expression '{expression}'"
                    )))
                }
            };
            (*value, exponent)
        }
        _ => {
            return Err(Error::Parse(format!(
                "malformed time trigger expression '{expression}'"
            )))
        }
    };

    let value: f64 = value_str.parse().map_err(|_| {
        Error::Parse(format!(
            "invalid numeric value '{value_str}' in time trigger expression '{expression}'"
        ))
    })?;

    let picoseconds = value * 10f64.powi(exponent as i32);
    let picoseconds = picoseconds.round() as u64;

    if picoseconds == 0 {
        return Err(Error::Parse(format!(
            "time trigger expression '{expression}' resolves to a zero-picosecond target, \
             which is disallowed"
        )));
    }

    Ok(picoseconds)
}
