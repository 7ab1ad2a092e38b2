use std::marker::PhantomData;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

pub const MAX_DUTY_CYCLE: i64 = 100;
pub const DEFAULT_CYCLE_TIME_SECS: i64 = 600;

/// Duty cycle and PWM period as produced by an upstream calculator.
///
/// Positive duty calls for heat, negative for cool. Only a
/// `Demand<Validated>` can be handed to an output controller.
#[derive(Debug, Clone, Copy)]
pub struct Demand<State = Unvalidated> {
    duty_cycle: i64,
    cycle_time_secs: i64,
    _state: PhantomData<State>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DemandViolation {
    #[error("duty cycle {requested} outside -100..=100")]
    DutyCycleOutOfRange { requested: i64 },
    #[error("cycle time {requested}s must be positive")]
    CycleTimeNotPositive { requested: i64 },
}

impl Demand<Unvalidated> {
    pub fn new(duty_cycle: i64, cycle_time_secs: i64) -> Self {
        Self {
            duty_cycle,
            cycle_time_secs,
            _state: PhantomData,
        }
    }

    pub fn validate(self) -> Result<Demand<Validated>, DemandViolation> {
        if !(-MAX_DUTY_CYCLE..=MAX_DUTY_CYCLE).contains(&self.duty_cycle) {
            return Err(DemandViolation::DutyCycleOutOfRange {
                requested: self.duty_cycle,
            });
        }
        if self.cycle_time_secs <= 0 {
            return Err(DemandViolation::CycleTimeNotPositive {
                requested: self.cycle_time_secs,
            });
        }

        Ok(Demand {
            duty_cycle: self.duty_cycle,
            cycle_time_secs: self.cycle_time_secs,
            _state: PhantomData,
        })
    }
}

impl Demand<Validated> {
    /// Idle demand: nothing on, default period.
    pub fn idle() -> Self {
        Demand {
            duty_cycle: 0,
            cycle_time_secs: DEFAULT_CYCLE_TIME_SECS,
            _state: PhantomData,
        }
    }

    pub fn duty_cycle(&self) -> i64 {
        self.duty_cycle
    }

    pub fn cycle_time_secs(&self) -> i64 {
        self.cycle_time_secs
    }

    pub fn cycle_time(&self) -> Duration {
        Duration::from_secs(self.cycle_time_secs.unsigned_abs())
    }

    /// Length of the on-portion of one cycle: `|cycle_time * duty| / 100`.
    pub fn on_phase(&self) -> Duration {
        let scaled = self.cycle_time_secs.saturating_mul(self.duty_cycle).unsigned_abs();
        // scaled / 100 seconds, kept exact in milliseconds.
        Duration::from_millis(scaled.saturating_mul(10))
    }

    /// Length of the off-portion of one cycle.
    pub fn off_phase(&self) -> Duration {
        self.cycle_time().saturating_sub(self.on_phase())
    }

    /// Same duty cycle over a different period.
    pub fn with_cycle_time(self, cycle_time_secs: i64) -> Result<Self, DemandViolation> {
        Demand::new(self.duty_cycle, cycle_time_secs).validate()
    }
}

impl Default for Demand<Validated> {
    fn default() -> Self {
        Self::idle()
    }
}
