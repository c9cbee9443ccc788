//! Optional per-value residency tracking for `State<Enum>` instances.
//!
//! A [`ResidencyTracker`] accumulates, per enum value, how many ticks an
//! instance spent in that value. Trackers are checked out of and returned
//! to a [`ResidencyTrackerPool`], so the slot (and its accumulated history)
//! outlives any one tracker's lifetime — a recycled slot keeps contributing
//! to the aggregate it was handed out under, the same way a retired
//! pipeline stage's occupancy still counts toward a microarchitecture's
//! total residency histogram. At teardown, [`ResidencyTrackerPool::flush_all`]
//! writes one plain-text block per tracked enum type.

mod pool;
mod tracker;

pub use pool::ResidencyTrackerPool;
pub use tracker::ResidencyTracker;
