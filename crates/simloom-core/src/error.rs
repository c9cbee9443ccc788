//! The error type shared across the `simloom` workspace.
//!
//! Every fallible public API in `simloom-core`, `simloom-state`,
//! `simloom-notify`, and `simloom-trigger` returns `Result<T, Error>` so
//! callers never have to match on crate-specific error types when an
//! expression spans subsystems (e.g. a trigger leaf resolving a counter that
//! turns out to be out of range).

use thiserror::Error as ThisError;

/// Errors raised by the scheduler, state machinery, notification system, and
/// trigger engine.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// An operation that requires a particular finalize state was attempted
    /// in the wrong one: a `Scheduleable` created post-finalize, a
    /// `StartupEvent` scheduled post-finalize, or a precedence edge added
    /// post-finalize.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `Scheduler::finalize` found a cycle among declared precedence edges.
    #[error("precedence cycle detected among scheduleables: {0}")]
    PrecedenceCycle(String),

    /// An observer list was mutated from within a monitor or
    /// observation-state callback, or a monitor attempted to nest more than
    /// one level deep.
    #[error("reentrant modification of observer state: {0}")]
    ReentrantModification(String),

    /// A trigger expression referenced a tag, notification, counter, or
    /// statistic that could not be resolved.
    #[error("unknown name referenced in expression: {0}")]
    UnknownName(String),

    /// A trigger expression string was malformed.
    #[error("failed to parse expression: {0}")]
    Parse(String),

    /// A value fell outside its declared bounds: a `State` value outside its
    /// enum range, a `PayloadEvent` handle re-scheduled while already
    /// in-flight, or a `BoundedValue` violation.
    #[error("value out of bounds: {0}")]
    Bounds(String),

    /// An `AsyncEvent` was cancelled from a thread other than the one that
    /// owns the `Scheduler`.
    #[error("async scheduleable misused from a foreign thread: {0}")]
    AsyncMisuse(String),
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
