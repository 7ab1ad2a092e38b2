use crate::clock::{Clock, SystemClock};
use crate::control::{ControlStatus, OutputControl, TickReport};
use crate::demand::{Demand, Validated};
use crate::error::OutputResult;
use crate::pin::PinRegistry;
use crate::settings::ControllerSettings;
use crate::signal::ShutdownSignal;
use log::{debug, error, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Evaluation period. Switching error is bounded by one tick.
    pub tick: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub ticks_executed: u64,
    pub ticks_late: u64,
    pub max_lateness_us: u64,
    pub transitions: u64,
}

/// Shared handle to one controller.
///
/// The control loop and configuration callers go through the same mutex,
/// which is held for a single evaluation or update at a time.
pub struct OutputController<R: PinRegistry> {
    name: Arc<str>,
    control: Arc<Mutex<OutputControl<R>>>,
    stop: ShutdownSignal,
    clock: Arc<dyn Clock>,
}

impl<R: PinRegistry> Clone for OutputController<R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            control: Arc::clone(&self.control),
            stop: self.stop.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: PinRegistry> OutputController<R> {
    pub fn new(name: &str, control: OutputControl<R>) -> Self {
        Self::with_clock(name, control, Arc::new(SystemClock))
    }

    pub fn with_clock(name: &str, control: OutputControl<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: Arc::from(name),
            control: Arc::new(Mutex::new(control)),
            stop: ShutdownSignal::new(),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_outputs(&self, heat_identifier: &str, cool_identifier: &str) -> OutputResult<()> {
        let now = self.clock.now();
        self.lock()
            .update_outputs(heat_identifier, cool_identifier, now)
    }

    pub fn configure(&self, settings: &ControllerSettings) -> OutputResult<()> {
        let now = self.clock.now();
        self.lock().configure(settings, now)
    }

    pub fn reset(&self) -> OutputResult<()> {
        let now = self.clock.now();
        self.lock().reset(now)
    }

    pub fn set_demand(&self, demand: Demand<Validated>) {
        self.lock().set_demand(demand);
    }

    pub fn evaluate(&self) -> OutputResult<TickReport> {
        let now = self.clock.now();
        self.lock().evaluate(now)
    }

    pub fn status(&self) -> ControlStatus {
        self.lock().status()
    }

    pub fn heat_on(&self) -> bool {
        self.lock().heat_on()
    }

    pub fn cool_on(&self) -> bool {
        self.lock().cool_on()
    }

    /// Ask this controller's loop to reset its outputs and return.
    pub fn request_stop(&self) {
        self.stop.raise();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_raised()
    }

    fn lock(&self) -> MutexGuard<'_, OutputControl<R>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Periodic driver for one controller.
pub struct ControlLoop<R: PinRegistry> {
    controller: OutputController<R>,
    config: LoopConfig,
    stats: ExecutionStats,
}

impl<R: PinRegistry> ControlLoop<R> {
    pub fn new(controller: OutputController<R>, config: LoopConfig) -> Self {
        Self {
            controller,
            config,
            stats: ExecutionStats::default(),
        }
    }

    /// Reset, then evaluate once per tick until `cancel` or the controller's
    /// own stop request is raised. Outputs are reset again before returning,
    /// including after a fatal fault.
    pub fn run(&mut self, cancel: &ShutdownSignal) -> OutputResult<()> {
        let name = self.controller.name().to_string();
        info!(
            "Starting output control {} (tick {} ms)",
            name,
            self.config.tick.as_millis()
        );
        self.controller.reset()?;

        let tick = self.config.tick;
        let mut next_tick = Instant::now();
        let result = loop {
            if self.should_stop(cancel) {
                break Ok(());
            }

            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
                if self.should_stop(cancel) {
                    break Ok(());
                }
            }

            let lateness = Instant::now().saturating_duration_since(next_tick);
            if lateness > tick {
                self.stats.ticks_late += 1;
                debug!("Output control {} tick late by {:?}", name, lateness);
            }
            self.stats.max_lateness_us = self
                .stats
                .max_lateness_us
                .max(lateness.as_micros() as u64);

            match self.controller.evaluate() {
                Ok(report) => {
                    self.stats.ticks_executed += 1;
                    self.stats.transitions += report.transitions();
                }
                Err(e) => break Err(e),
            }

            next_tick += tick;
            // Re-anchor after a stall instead of firing a burst of ticks.
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
        };

        let shutdown = self.controller.reset();
        if let Err(e) = &result {
            error!("Output control {} stopped on fault: {}", name, e);
            return result;
        }
        if let Err(e) = &shutdown {
            error!("Output control {} failed to reset on shutdown: {}", name, e);
        }
        shutdown?;
        info!("Output control {} stopped, outputs off", name);
        Ok(())
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    fn should_stop(&self, cancel: &ShutdownSignal) -> bool {
        cancel.is_raised() || self.controller.stop_requested()
    }
}
