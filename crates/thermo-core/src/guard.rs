use std::time::Duration;

/// Minimum on and off durations protecting compressors and contactors from
/// short-cycling.
///
/// Only phase-driven transitions are gated. Forced offs (idle demand,
/// opposite-sign demand, reset) always go through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortCycleGuard {
    pub min_on: Duration,
    pub min_off: Duration,
}

impl ShortCycleGuard {
    pub fn new(min_on: Duration, min_off: Duration) -> Self {
        Self { min_on, min_off }
    }

    pub fn is_disabled(&self) -> bool {
        self.min_on.is_zero() && self.min_off.is_zero()
    }

    /// Whether an output that has been on for `on_for` may end its on-phase.
    pub fn allows_off(&self, on_for: Duration) -> bool {
        on_for >= self.min_on
    }

    /// Whether an output that has been off for `off_for` may switch on.
    pub fn allows_on(&self, off_for: Duration) -> bool {
        off_for >= self.min_off
    }
}
