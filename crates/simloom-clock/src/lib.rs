//! Clock domains mapping scheduler ticks to per-domain cycle counts.

use std::sync::Arc;

use thiserror::Error;

/// The scheduler's logical time unit: a monotonically non-decreasing tick count.
pub type Tick = u64;

/// Errors that can occur while constructing a [`ClockDomain`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClockError {
    #[error("clock domain period must be >= 1, got {0}")]
    InvalidPeriod(u64),
}

#[derive(Debug)]
struct ClockDomainInner {
    name: String,
    period: u64,
    parent: Option<ClockDomain>,
}

/// A named clock domain mapping root-clock ticks to domain-local cycles.
///
/// Clock domains form a tree rooted at a mandatory period-1 root clock.
/// `cycle = tick / period`; `tick_of(cycle) = cycle * period`. The period is
/// expressed in root-clock ticks, not relative to the immediate parent.
///
/// Cloning a `ClockDomain` is cheap (an `Arc` bump); lifetime is expected to
/// match the owning [`Scheduler`](https://docs.rs/simloom-core)'s.
#[derive(Clone, Debug)]
pub struct ClockDomain(Arc<ClockDomainInner>);

impl ClockDomain {
    /// Construct the mandatory root clock domain: `period = 1`, no parent.
    pub fn root(name: impl Into<String>) -> Self {
        Self(Arc::new(ClockDomainInner {
            name: name.into(),
            period: 1,
            parent: None,
        }))
    }

    /// Construct a child clock domain with the given period, expressed in
    /// root-clock ticks.
    ///
    /// # Errors
    /// Returns [`ClockError::InvalidPeriod`] if `period` is zero.
    pub fn child(
        name: impl Into<String>,
        period: u64,
        parent: &ClockDomain,
    ) -> Result<Self, ClockError> {
        if period == 0 {
            return Err(ClockError::InvalidPeriod(period));
        }

        Ok(Self(Arc::new(ClockDomainInner {
            name: name.into(),
            period,
            parent: Some(parent.clone()),
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn period(&self) -> u64 {
        self.0.period
    }

    pub fn parent(&self) -> Option<&ClockDomain> {
        self.0.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Convert a root-clock tick into this domain's cycle count.
    pub fn cycle(&self, tick: Tick) -> u64 {
        tick / self.0.period
    }

    /// Convert a cycle count in this domain back to a root-clock tick.
    pub fn tick_of(&self, cycle: u64) -> Tick {
        cycle * self.0.period
    }
}

impl PartialEq for ClockDomain {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClockDomain {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_clock_has_period_one() {
        let root = ClockDomain::root("root");
        assert_eq!(root.period(), 1);
        assert!(root.is_root());
        assert_eq!(root.cycle(42), 42);
        assert_eq!(root.tick_of(42), 42);
    }

    #[test]
    fn child_clock_divides_ticks() {
        let root = ClockDomain::root("root");
        let half = ClockDomain::child("half", 2, &root).unwrap();

        assert_eq!(half.cycle(0), 0);
        assert_eq!(half.cycle(1), 0);
        assert_eq!(half.cycle(2), 1);
        assert_eq!(half.cycle(3), 1);
        assert_eq!(half.tick_of(1), 2);
    }

    #[test]
    fn zero_period_is_rejected() {
        let root = ClockDomain::root("root");
        assert!(matches!(
            ClockDomain::child("bad", 0, &root),
            Err(ClockError::InvalidPeriod(0))
        ));
    }

    #[test]
    fn distinct_constructions_compare_unequal() {
        let root = ClockDomain::root("root");
        let a = ClockDomain::child("a", 3, &root).unwrap();
        let b = ClockDomain::child("a", 3, &root).unwrap();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
