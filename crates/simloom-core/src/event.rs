//! The `Event` family: policy-bearing wrappers around a registered
//! scheduleable.
//!
//! All variants delegate to [`Scheduler`] via a contained
//! [`ScheduleableId`]; they differ only in the policy around what it means
//! to schedule them.

use std::cell::RefCell;
use std::rc::Rc;

use slab::Slab;

use crate::error::{Error, Result};
use crate::phase::SchedulingPhase;
use crate::scheduleable::{ScheduleableId, ScheduleableSpec};
use crate::scheduler::Scheduler;

/// Common surface shared by the plain event variants, letting callers that
/// don't care about dedup policy (state observer lists, notification
/// registries) hold either kind behind one type parameter.
pub trait Scheduled: Copy {
    fn id(&self) -> ScheduleableId;
    fn schedule(&self, scheduler: &mut Scheduler, delay: u64) -> Result<()>;
    fn cancel(&self, scheduler: &mut Scheduler);
}

/// A plain, repeatable scheduleable. Each `schedule` call inserts an
/// independent entry; multiple calls within the same tick fire the handler
/// multiple times, once per call, in insertion order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Event {
    id: ScheduleableId,
    phase: SchedulingPhase,
}

impl Event {
    /// Register a new `Event` with the scheduler.
    pub fn register(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        phase: SchedulingPhase,
        handler: impl FnMut(&mut Scheduler) + 'static,
    ) -> Result<Self> {
        let id = scheduler.register(ScheduleableSpec::new(label, phase), handler)?;
        Ok(Self { id, phase })
    }

    pub fn id(&self) -> ScheduleableId {
        self.id
    }

    /// Schedule this event to fire `delay` ticks from now.
    pub fn schedule(&self, scheduler: &mut Scheduler, delay: u64) -> Result<()> {
        scheduler.schedule_relative(self.id, delay, self.phase)
    }

    pub fn cancel(&self, scheduler: &mut Scheduler) {
        scheduler.cancel(self.id)
    }
}

impl Scheduled for Event {
    fn id(&self) -> ScheduleableId {
        self.id
    }

    fn schedule(&self, scheduler: &mut Scheduler, delay: u64) -> Result<()> {
        Event::schedule(self, scheduler, delay)
    }

    fn cancel(&self, scheduler: &mut Scheduler) {
        Event::cancel(self, scheduler)
    }
}

/// An event that dedups within a single `(tick, phase)`: repeated
/// `schedule()` calls collapse to at most one firing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct UniqueEvent {
    id: ScheduleableId,
    phase: SchedulingPhase,
}

impl UniqueEvent {
    pub fn register(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        phase: SchedulingPhase,
        handler: impl FnMut(&mut Scheduler) + 'static,
    ) -> Result<Self> {
        let id = scheduler.register(ScheduleableSpec::new(label, phase).unique(true), handler)?;
        Ok(Self { id, phase })
    }

    pub fn id(&self) -> ScheduleableId {
        self.id
    }

    pub fn schedule(&self, scheduler: &mut Scheduler, delay: u64) -> Result<()> {
        scheduler.schedule_relative(self.id, delay, self.phase)
    }

    pub fn cancel(&self, scheduler: &mut Scheduler) {
        scheduler.cancel(self.id)
    }
}

impl Scheduled for UniqueEvent {
    fn id(&self) -> ScheduleableId {
        self.id
    }

    fn schedule(&self, scheduler: &mut Scheduler, delay: u64) -> Result<()> {
        UniqueEvent::schedule(self, scheduler, delay)
    }

    fn cancel(&self, scheduler: &mut Scheduler) {
        UniqueEvent::cancel(self, scheduler)
    }
}

/// A handle bound to a future firing of a [`PayloadEvent`], carrying a copy
/// of the payload captured at `prepare_payload` time.
///
/// Each handle fires at most once. Scheduling a handle that is already
/// in-flight is an error.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PayloadHandle {
    id: ScheduleableId,
    slot: usize,
}

struct Slot<P> {
    id: ScheduleableId,
    payload: Option<P>,
    in_flight: bool,
}

/// An event that carries a payload captured at `prepare_payload` time.
///
/// Internally backed by a pool of pre-registered scheduleables: a handle
/// is owned by the scheduler once scheduled, and is released back to the
/// pool after firing. The pool is sized at construction and only grows
/// before `finalize`, since no new scheduleable may be registered
/// afterwards.
pub struct PayloadEvent<P: 'static> {
    phase: SchedulingPhase,
    slots: Rc<RefCell<Slab<Slot<P>>>>,
    label: String,
    handler: Rc<RefCell<dyn FnMut(&mut Scheduler, &P)>>,
}

impl<P: 'static> PayloadEvent<P> {
    /// Create a new `PayloadEvent` with an initial pool capacity. Call
    /// [`PayloadEvent::grow`] before `finalize` if more in-flight payloads
    /// than `initial_capacity` are ever needed at once.
    pub fn register(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        phase: SchedulingPhase,
        initial_capacity: usize,
        mut handler: impl FnMut(&mut Scheduler, &P) + 'static,
    ) -> Result<Self> {
        let label = label.into();
        let slots: Rc<RefCell<Slab<Slot<P>>>> = Rc::new(RefCell::new(Slab::new()));
        let handler: Rc<RefCell<dyn FnMut(&mut Scheduler, &P)>> =
            Rc::new(RefCell::new(move |scheduler: &mut Scheduler, payload: &P| {
                handler(scheduler, payload)
            }));

        let event = Self {
            phase,
            slots: slots.clone(),
            label: label.clone(),
            handler,
        };

        for _ in 0..initial_capacity {
            event.add_slot(scheduler)?;
        }

        Ok(event)
    }

    fn add_slot(&self, scheduler: &mut Scheduler) -> Result<()> {
        let slots = self.slots.clone();
        let label = self.label.clone();
        let handler = self.handler.clone();

        // Reserve the slab entry first so the registered handler can
        // capture its own index.
        let reserved = slots.borrow_mut().vacant_key();

        let id = scheduler.register(
            ScheduleableSpec::new(format!("{label}#{reserved}"), self.phase),
            move |scheduler| {
                let payload = {
                    let mut slots = slots.borrow_mut();
                    let slot = &mut slots[reserved];
                    slot.in_flight = false;
                    slot.payload.take()
                };

                if let Some(payload) = payload {
                    handler.borrow_mut()(scheduler, &payload);
                }
            },
        )?;

        let key = self.slots.borrow_mut().insert(Slot {
            id,
            payload: None,
            in_flight: false,
        });
        debug_assert_eq!(key, reserved);

        Ok(())
    }

    /// Grow the pool by one slot. Only legal before `finalize`.
    pub fn grow(&self, scheduler: &mut Scheduler) -> Result<()> {
        self.add_slot(scheduler)
    }

    /// Bind a copy of `payload` to a free slot, returning a handle that
    /// fires at most once.
    ///
    /// # Errors
    /// Returns [`Error::Bounds`] if every slot in the pool is currently
    /// in-flight.
    pub fn prepare_payload(&self, payload: P) -> Result<PayloadHandle> {
        let mut slots = self.slots.borrow_mut();
        let free = slots
            .iter()
            .find(|(_, slot)| !slot.in_flight)
            .map(|(key, _)| key);

        let Some(key) = free else {
            return Err(Error::Bounds(format!(
                "PayloadEvent '{}' has no free slot; all {} are in flight",
                self.label,
                slots.len()
            )));
        };

        let slot = &mut slots[key];
        slot.in_flight = true;
        slot.payload = Some(payload);

        Ok(PayloadHandle { id: slot.id, slot: key })
    }

    /// Schedule a previously-prepared handle to fire `delay` ticks from
    /// now.
    ///
    /// # Errors
    /// Returns [`Error::Bounds`] if `handle` is not currently in flight
    /// (already fired, or never prepared on this event).
    pub fn schedule(&self, scheduler: &mut Scheduler, handle: PayloadHandle, delay: u64) -> Result<()> {
        let in_flight = self
            .slots
            .borrow()
            .get(handle.slot)
            .map(|slot| slot.in_flight && slot.id == handle.id)
            .unwrap_or(false);

        if !in_flight {
            return Err(Error::Bounds(
                "PayloadEvent handle is not currently in flight".into(),
            ));
        }

        scheduler.schedule_relative(handle.id, delay, self.phase)
    }
}

/// A scheduleable registered while the scheduler is pre-finalized, that
/// fires exactly once immediately after `finalize`, before tick 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StartupEvent {
    id: ScheduleableId,
}

impl StartupEvent {
    /// Register a startup handler.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the scheduler is already
    /// finalized.
    pub fn register(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        phase: SchedulingPhase,
        handler: impl FnMut(&mut Scheduler) + 'static,
    ) -> Result<Self> {
        let id = scheduler.register(ScheduleableSpec::new(label, phase), handler)?;
        scheduler.schedule_startup_handler(id)?;
        Ok(Self { id })
    }

    pub fn id(&self) -> ScheduleableId {
        self.id
    }
}

/// The sole externally-mutable scheduleable: the only one with a schedule
/// path that genuinely crosses threads.
///
/// `Scheduler` itself is neither `Send` nor `Sync` (its handlers are plain
/// `FnMut` closures), so a worker thread can never hold a `&Scheduler` to
/// call `schedule_async` on in the first place. The actual cross-thread
/// primitive is [`AsyncHandle`](crate::scheduler::AsyncHandle), obtained via
/// [`AsyncEvent::handle`] on the owning thread and moved into the worker;
/// it wraps only the lock-protected inbox, which is `Send + Sync`.
/// Cancellation is not exposed cross-thread: `Scheduler::cancel` can only be
/// called from the owning thread by construction, replacing the source
/// framework's runtime `AsyncMisuseError` check with a compile-time
/// guarantee.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AsyncEvent {
    id: ScheduleableId,
}

impl AsyncEvent {
    pub fn register(
        scheduler: &mut Scheduler,
        label: impl Into<String>,
        phase: SchedulingPhase,
        handler: impl FnMut(&mut Scheduler) + 'static,
    ) -> Result<Self> {
        let id = scheduler.register(ScheduleableSpec::new(label, phase), handler)?;
        Ok(Self { id })
    }

    pub fn id(&self) -> ScheduleableId {
        self.id
    }

    /// Schedule this event from the owning thread. The entry is buffered
    /// and applied at the start of the next tick processed by
    /// [`Scheduler::run`].
    pub fn schedule_async(&self, scheduler: &Scheduler, delay: u64) {
        scheduler.schedule_async(self.id, delay)
    }

    /// Obtain a `Send + Sync` handle that can be moved into another thread
    /// and used to schedule this event without ever touching the
    /// scheduler itself.
    pub fn handle(&self, scheduler: &Scheduler) -> crate::scheduler::AsyncHandle {
        scheduler.async_handle(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn event_fires_once_per_schedule_call() {
        let mut scheduler = Scheduler::new();
        let count = Rc::new(RefCell::new(0));
        let count2 = count.clone();

        let event = Event::register(&mut scheduler, "e", SchedulingPhase::Tick, move |_s| {
            *count2.borrow_mut() += 1;
        })
        .unwrap();

        scheduler.finalize().unwrap();

        event.schedule(&mut scheduler, 1).unwrap();
        event.schedule(&mut scheduler, 1).unwrap();
        event.schedule(&mut scheduler, 1).unwrap();

        scheduler.run(2, false).unwrap();

        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn payload_event_delivers_distinct_payloads_and_releases_slots() {
        let mut scheduler = Scheduler::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();

        let event = PayloadEvent::<u32>::register(
            &mut scheduler,
            "p",
            SchedulingPhase::Tick,
            2,
            move |_s, payload| seen2.borrow_mut().push(*payload),
        )
        .unwrap();

        scheduler.finalize().unwrap();

        let h1 = event.prepare_payload(10).unwrap();
        let h2 = event.prepare_payload(20).unwrap();
        event.schedule(&mut scheduler, h1, 1).unwrap();
        event.schedule(&mut scheduler, h2, 1).unwrap();

        scheduler.run(2, false).unwrap();

        {
            let mut sorted = seen.borrow().clone();
            sorted.sort();
            assert_eq!(sorted, vec![10, 20]);
        }

        // Both slots were released back to the pool after firing, so a
        // third payload can be prepared without growing the pool.
        let h3 = event.prepare_payload(30).unwrap();
        event.schedule(&mut scheduler, h3, 1).unwrap();
        scheduler.run(2, false).unwrap();

        assert_eq!(*seen.borrow(), vec![10, 20, 30]);
    }

    #[test]
    fn payload_event_rejects_scheduling_without_free_slot() {
        let mut scheduler = Scheduler::new();
        let event = PayloadEvent::<u32>::register(
            &mut scheduler,
            "p",
            SchedulingPhase::Tick,
            1,
            |_s, _p| {},
        )
        .unwrap();

        scheduler.finalize().unwrap();

        let _h1 = event.prepare_payload(1).unwrap();
        let err = event.prepare_payload(2);
        assert!(matches!(err, Err(Error::Bounds(_))));
    }

    #[test]
    fn startup_event_fires_once_before_tick_one() {
        let mut scheduler = Scheduler::new();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();

        StartupEvent::register(&mut scheduler, "startup", SchedulingPhase::Trigger, move |_s| {
            *fired2.borrow_mut() += 1;
        })
        .unwrap();

        scheduler.finalize().unwrap();
        assert_eq!(*fired.borrow(), 1);

        scheduler.run(5, false).unwrap();
        assert_eq!(*fired.borrow(), 1, "startup handler never fires again");
    }
}
