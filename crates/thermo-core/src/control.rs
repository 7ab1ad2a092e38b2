//! Time-proportioning of a heat/cool output pair.
//!
//! Each tick compares the time since the active output's last transition
//! with the on- or off-phase implied by the current demand. Phases are
//! measured from recorded timestamps rather than counted ticks, so a late
//! tick only delays one transition and never skews the duty ratio.
//!
//! Starting from off, an output waits one full off-phase before its first
//! on-phase.

use crate::demand::{Demand, Validated};
use crate::error::{OutputError, OutputResult};
use crate::guard::ShortCycleGuard;
use crate::output::{Change, DigitalOutput, OutputState};
use crate::pin::PinRegistry;
use crate::settings::ControllerSettings;
use log::info;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transitions performed by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub heat: Change,
    pub cool: Change,
}

impl TickReport {
    pub fn transitions(&self) -> u64 {
        u64::from(self.heat.is_transition()) + u64::from(self.cool.is_transition())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputStatus {
    pub identifier: String,
    pub friendly_name: String,
    pub on: bool,
    pub verify_failures: u64,
}

/// Read-only snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    pub duty_cycle: i64,
    pub cycle_time_secs: i64,
    pub heat: Option<OutputStatus>,
    pub cool: Option<OutputStatus>,
}

impl ControlStatus {
    pub fn heat_on(&self) -> bool {
        self.heat.as_ref().is_some_and(|o| o.on)
    }

    pub fn cool_on(&self) -> bool {
        self.cool.as_ref().is_some_and(|o| o.on)
    }
}

pub struct OutputControl<R: PinRegistry> {
    registry: Arc<R>,
    heat: Option<DigitalOutput<R>>,
    cool: Option<DigitalOutput<R>>,
    demand: Demand<Validated>,
    guard: ShortCycleGuard,
}

impl<R: PinRegistry> OutputControl<R> {
    /// An idle controller with no outputs configured.
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            heat: None,
            cool: None,
            demand: Demand::idle(),
            guard: ShortCycleGuard::default(),
        }
    }

    pub fn heat(&self) -> Option<&DigitalOutput<R>> {
        self.heat.as_ref()
    }

    pub fn cool(&self) -> Option<&DigitalOutput<R>> {
        self.cool.as_ref()
    }

    pub fn heat_on(&self) -> bool {
        self.heat.as_ref().is_some_and(DigitalOutput::is_on)
    }

    pub fn cool_on(&self) -> bool {
        self.cool.as_ref().is_some_and(DigitalOutput::is_on)
    }

    pub fn demand(&self) -> Demand<Validated> {
        self.demand
    }

    pub fn set_demand(&mut self, demand: Demand<Validated>) {
        self.demand = demand;
    }

    pub fn guard(&self) -> ShortCycleGuard {
        self.guard
    }

    pub fn set_guard(&mut self, guard: ShortCycleGuard) {
        self.guard = guard;
    }

    /// Create, rebind or drop each output to match the given identifiers.
    /// An empty identifier means the side is not wired.
    pub fn update_outputs(
        &mut self,
        heat_identifier: &str,
        cool_identifier: &str,
        now: Instant,
    ) -> OutputResult<()> {
        update_slot(&mut self.heat, &self.registry, heat_identifier, now)?;
        update_slot(&mut self.cool, &self.registry, cool_identifier, now)
    }

    /// Apply stored settings: bindings, names, period and guard. The duty
    /// cycle is left alone. An invalid period is rejected before any output
    /// is touched.
    pub fn configure(&mut self, settings: &ControllerSettings, now: Instant) -> OutputResult<()> {
        let demand = self
            .demand
            .with_cycle_time(settings.cycle_time_secs)
            .map_err(|source| OutputError::InvalidSettings { source })?;
        self.update_outputs(&settings.heat.identifier, &settings.cool.identifier, now)?;
        if let Some(heat) = self.heat.as_mut() {
            heat.set_friendly_name(settings.heat.friendly_name.as_str());
        }
        if let Some(cool) = self.cool.as_mut() {
            cool.set_friendly_name(settings.cool.friendly_name.as_str());
        }
        self.demand = demand;
        self.guard = settings.guard;
        Ok(())
    }

    /// Force every configured output off. Both sides are attempted even if
    /// the first one fails; the first error is returned.
    pub fn reset(&mut self, now: Instant) -> OutputResult<()> {
        let heat = self.heat.as_mut().map(|o| o.reset(now)).transpose();
        let cool = self.cool.as_mut().map(|o| o.reset(now)).transpose();
        heat?;
        cool?;
        Ok(())
    }

    /// Decide and perform this tick's transitions.
    ///
    /// The output that must be off is always switched before the other one is
    /// allowed on, so both are never on together.
    pub fn evaluate(&mut self, now: Instant) -> OutputResult<TickReport> {
        let duty = self.demand.duty_cycle();
        let on_phase = self.demand.on_phase();
        let off_phase = self.demand.off_phase();
        let guard = self.guard;

        let report = match duty {
            0 => TickReport {
                heat: force_off(&mut self.heat, now)?,
                cool: force_off(&mut self.cool, now)?,
            },
            100 => {
                let cool = force_off(&mut self.cool, now)?;
                TickReport {
                    heat: saturate(&mut self.heat, guard, now)?,
                    cool,
                }
            }
            -100 => {
                let heat = force_off(&mut self.heat, now)?;
                TickReport {
                    heat,
                    cool: saturate(&mut self.cool, guard, now)?,
                }
            }
            d if d > 0 => {
                let cool = force_off(&mut self.cool, now)?;
                TickReport {
                    heat: proportion(&mut self.heat, on_phase, off_phase, guard, now)?,
                    cool,
                }
            }
            _ => {
                let heat = force_off(&mut self.heat, now)?;
                TickReport {
                    heat,
                    cool: proportion(&mut self.cool, on_phase, off_phase, guard, now)?,
                }
            }
        };
        Ok(report)
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            duty_cycle: self.demand.duty_cycle(),
            cycle_time_secs: self.demand.cycle_time_secs(),
            heat: self.heat.as_ref().map(output_status),
            cool: self.cool.as_ref().map(output_status),
        }
    }
}

fn update_slot<R: PinRegistry>(
    slot: &mut Option<DigitalOutput<R>>,
    registry: &Arc<R>,
    identifier: &str,
    now: Instant,
) -> OutputResult<()> {
    if identifier.is_empty() {
        if let Some(mut output) = slot.take() {
            info!("Removing output {}", output.label());
            let _ = output.reset(now)?;
        }
        return Ok(());
    }
    if let Some(output) = slot.as_mut() {
        return output.rebind(identifier, now);
    }

    let mut output = DigitalOutput::new(Arc::clone(registry), identifier);
    let _ = output.reset(now)?;
    *slot = Some(output);
    Ok(())
}

fn force_off<R: PinRegistry>(
    slot: &mut Option<DigitalOutput<R>>,
    now: Instant,
) -> OutputResult<Change> {
    match slot.as_mut() {
        Some(output) => output.off(now),
        None => Ok(Change::Unchanged),
    }
}

/// Continuous full-on demand.
fn saturate<R: PinRegistry>(
    slot: &mut Option<DigitalOutput<R>>,
    guard: ShortCycleGuard,
    now: Instant,
) -> OutputResult<Change> {
    let Some(output) = slot.as_mut() else {
        return Ok(Change::Unchanged);
    };
    if let OutputState::Off { since } = output.state() {
        if !guard.allows_on(elapsed(since, now)) {
            return Ok(Change::Unchanged);
        }
    }
    output.on(now)
}

/// Partial demand: end the current phase once it has run its course.
fn proportion<R: PinRegistry>(
    slot: &mut Option<DigitalOutput<R>>,
    on_phase: Duration,
    off_phase: Duration,
    guard: ShortCycleGuard,
    now: Instant,
) -> OutputResult<Change> {
    let Some(output) = slot.as_mut() else {
        return Ok(Change::Unchanged);
    };
    match output.state() {
        OutputState::On { since } => {
            let on_for = elapsed(since, now);
            if on_for > on_phase && guard.allows_off(on_for) {
                info!(
                    "Output {} turning off after {:.1}s",
                    output.label(),
                    on_for.as_secs_f64()
                );
                output.off(now)
            } else {
                Ok(Change::Unchanged)
            }
        }
        OutputState::Off { since } => {
            let off_for = elapsed(since, now);
            if off_for >= off_phase && guard.allows_on(off_for) {
                info!(
                    "Output {} turning on after {:.1}s",
                    output.label(),
                    off_for.as_secs_f64()
                );
                output.on(now)
            } else {
                Ok(Change::Unchanged)
            }
        }
        OutputState::Unknown => output.off(now),
    }
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(since)
}

fn output_status<R: PinRegistry>(output: &DigitalOutput<R>) -> OutputStatus {
    OutputStatus {
        identifier: output.identifier().to_string(),
        friendly_name: output.friendly_name().to_string(),
        on: output.is_on(),
        verify_failures: output.verify_failures(),
    }
}
