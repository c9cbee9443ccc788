//! The tick scheduler: ticks, scheduling phases, scheduleables, and the
//! `Event` family.
//!
//! This crate is the heart of `simloom`: a single-threaded cooperative
//! event loop that orders handler invocations within each tick across a
//! fixed set of scheduling phases, honoring both user-declared precedence
//! between handlers and the implicit phase ordering.

mod error;
mod event;
mod phase;
mod scheduleable;
mod scheduler;

pub use error::{Error, Result};
pub use event::{AsyncEvent, Event, PayloadEvent, PayloadHandle, Scheduled, StartupEvent, UniqueEvent};
pub use phase::SchedulingPhase;
pub use scheduleable::{ScheduleableId, ScheduleableInfo, ScheduleableSpec};
pub use scheduler::{AsyncHandle, Scheduler, SchedulerConfig};

pub use simloom_clock::{ClockDomain, ClockError, Tick};
