//! One physical output line with write verification.
//!
//! A `DigitalOutput` remembers when it last switched and in which direction,
//! and checks the hardware read-back before trusting that record. A line
//! toggled by hand, or left high by a previous crash, is corrected on the
//! next command instead of being skipped as "already there".

use crate::error::{OutputError, OutputResult};
use crate::pin::{Level, OutputPin, PinRegistry};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Last recorded transition of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Never driven since creation or rebinding.
    Unknown,
    On { since: Instant },
    Off { since: Instant },
}

/// Result of an on/off command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Change {
    Unchanged,
    Transitioned,
}

impl Change {
    pub fn is_transition(self) -> bool {
        matches!(self, Change::Transitioned)
    }
}

pub struct DigitalOutput<R: PinRegistry> {
    identifier: String,
    friendly_name: String,
    registry: Arc<R>,
    handle: Option<R::Pin>,
    state: OutputState,
    verify_failures: u64,
}

impl<R: PinRegistry> DigitalOutput<R> {
    /// Create an output bound to `identifier`. The pin is not resolved until
    /// it is first used.
    pub fn new(registry: Arc<R>, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            friendly_name: String::new(),
            registry,
            handle: None,
            state: OutputState::Unknown,
            verify_failures: 0,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn set_friendly_name(&mut self, name: impl Into<String>) {
        self.friendly_name = name.into();
    }

    /// Name used in log lines: the friendly name when set.
    pub fn label(&self) -> &str {
        if self.friendly_name.is_empty() {
            &self.identifier
        } else {
            &self.friendly_name
        }
    }

    /// An output without identifier only keeps its state record.
    pub fn is_wired(&self) -> bool {
        !self.identifier.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.is_some()
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        matches!(self.state, OutputState::On { .. })
    }

    pub fn is_off(&self) -> bool {
        matches!(self.state, OutputState::Off { .. })
    }

    pub fn on_time(&self) -> Option<Instant> {
        match self.state {
            OutputState::On { since } => Some(since),
            _ => None,
        }
    }

    pub fn off_time(&self) -> Option<Instant> {
        match self.state {
            OutputState::Off { since } => Some(since),
            _ => None,
        }
    }

    /// Writes whose read-back still disagreed after the last attempt.
    pub fn verify_failures(&self) -> u64 {
        self.verify_failures
    }

    pub fn on(&mut self, now: Instant) -> OutputResult<Change> {
        self.drive(Level::High, now)
    }

    pub fn off(&mut self, now: Instant) -> OutputResult<Change> {
        self.drive(Level::Low, now)
    }

    /// Bring the output to a known-off state, resolving the pin first.
    pub fn reset(&mut self, now: Instant) -> OutputResult<Change> {
        if self.is_wired() && self.handle.is_none() {
            resolve_handle(&mut self.handle, &*self.registry, &self.identifier)?;
        }
        self.off(now)
    }

    /// Move the output to another line.
    ///
    /// The old line is driven off before the new one is resolved, and the new
    /// line starts off with a fresh state record. An empty identifier only
    /// resets the current binding; dropping the output is up to the caller.
    pub fn rebind(&mut self, identifier: &str, now: Instant) -> OutputResult<()> {
        if identifier.is_empty() {
            let _ = self.reset(now)?;
            return Ok(());
        }
        if identifier == self.identifier {
            return Ok(());
        }

        info!(
            "Rebinding output {} from {:?} to {:?}",
            self.label(),
            self.identifier,
            identifier
        );
        let _ = self.reset(now)?;
        self.handle = None;
        self.identifier = identifier.to_string();
        self.state = OutputState::Unknown;
        let _ = self.reset(now)?;
        Ok(())
    }

    fn drive(&mut self, level: Level, now: Instant) -> OutputResult<Change> {
        let recorded = match level {
            Level::High => self.is_on(),
            Level::Low => self.is_off(),
        };

        if !self.is_wired() {
            if recorded {
                return Ok(Change::Unchanged);
            }
            self.record(level, now);
            return Ok(Change::Transitioned);
        }

        let pin = resolve_handle(&mut self.handle, &*self.registry, &self.identifier)?;
        if recorded && pin.read() == level {
            return Ok(Change::Unchanged);
        }

        write_pin(pin, level, &self.identifier)?;
        if pin.read() != level && level == Level::High {
            warn!(
                "Output {:?} did not read back {:?}, retrying write",
                self.identifier, level
            );
            write_pin(pin, level, &self.identifier)?;
        }
        if pin.read() != level {
            self.verify_failures += 1;
            warn!(
                "Output {:?} still reads {:?} after writing {:?}; continuing degraded",
                self.identifier,
                pin.read(),
                level
            );
        }

        self.record(level, now);
        Ok(Change::Transitioned)
    }

    fn record(&mut self, level: Level, now: Instant) {
        self.state = match level {
            Level::High => OutputState::On { since: now },
            Level::Low => OutputState::Off { since: now },
        };
    }
}

fn resolve_handle<'a, R: PinRegistry>(
    handle: &'a mut Option<R::Pin>,
    registry: &R,
    identifier: &str,
) -> OutputResult<&'a mut R::Pin> {
    let pin = match handle.take() {
        Some(pin) => pin,
        None => {
            let pin = registry
                .resolve(identifier)
                .ok_or_else(|| OutputError::Unresolved {
                    identifier: identifier.to_string(),
                })?;
            debug!("Resolved output pin {:?}", identifier);
            pin
        }
    };
    Ok(handle.insert(pin))
}

fn write_pin<P: OutputPin>(pin: &mut P, level: Level, identifier: &str) -> OutputResult<()> {
    pin.write(level).map_err(|source| OutputError::WriteFailed {
        identifier: identifier.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin_sim::{PinEvent, SimulatedRegistry};
    use std::time::Duration;

    fn output(registry: &SimulatedRegistry, identifier: &str) -> DigitalOutput<SimulatedRegistry> {
        DigitalOutput::new(Arc::new(registry.clone()), identifier)
    }

    #[test]
    fn second_on_is_a_no_op() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        let now = Instant::now();

        assert_eq!(heat.on(now).unwrap(), Change::Transitioned);
        assert_eq!(heat.on(now).unwrap(), Change::Unchanged);
        assert_eq!(registry.write_count("GPIO17"), 1);
        assert!(registry.is_high("GPIO17"));
    }

    #[test]
    fn external_toggle_is_corrected() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        let start = Instant::now();

        assert_eq!(heat.on(start).unwrap(), Change::Transitioned);
        registry.force_level("GPIO17", Level::Low);

        let later = start + Duration::from_secs(5);
        assert_eq!(heat.on(later).unwrap(), Change::Transitioned);
        assert!(registry.is_high("GPIO17"));
        assert_eq!(heat.on_time(), Some(later));
    }

    #[test]
    fn on_retries_once_after_bad_readback() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        registry.ignore_writes("GPIO17", 1);

        assert_eq!(heat.on(Instant::now()).unwrap(), Change::Transitioned);
        assert_eq!(registry.write_count("GPIO17"), 2);
        assert!(registry.is_high("GPIO17"));
        assert_eq!(heat.verify_failures(), 0);
    }

    #[test]
    fn persistent_mismatch_is_degraded_not_fatal() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        registry.ignore_writes("GPIO17", 2);

        assert_eq!(heat.on(Instant::now()).unwrap(), Change::Transitioned);
        assert_eq!(registry.write_count("GPIO17"), 2);
        assert!(!registry.is_high("GPIO17"));
        assert!(heat.is_on());
        assert_eq!(heat.verify_failures(), 1);
    }

    #[test]
    fn off_does_not_retry() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        let now = Instant::now();
        let _ = heat.on(now).unwrap();
        registry.ignore_writes("GPIO17", 1);

        let _ = heat.off(now).unwrap();
        assert_eq!(registry.write_count("GPIO17"), 2);
        assert!(heat.is_off());
        assert_eq!(heat.verify_failures(), 1);
    }

    #[test]
    fn unknown_identifier_is_fatal() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO99");

        let err = heat.reset(Instant::now()).unwrap_err();
        assert_eq!(
            err,
            OutputError::Unresolved {
                identifier: "GPIO99".into()
            }
        );
    }

    #[test]
    fn write_fault_is_fatal() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]);
        let mut heat = output(&registry, "GPIO17");
        registry.fail_writes("GPIO17", true);

        let err = heat.on(Instant::now()).unwrap_err();
        assert!(matches!(err, OutputError::WriteFailed { .. }));
        assert_eq!(err.identifier(), Some("GPIO17"));
        assert_eq!(heat.state(), OutputState::Unknown);
    }

    #[test]
    fn pin_is_resolved_lazily() {
        let registry = SimulatedRegistry::with_lines(["GPIO17"]).with_journal();
        let mut heat = output(&registry, "GPIO17");
        assert!(!heat.is_resolved());
        assert!(registry.journal().is_empty());

        let _ = heat.reset(Instant::now()).unwrap();
        assert!(heat.is_resolved());
        assert!(heat.is_off());
        assert!(heat.off_time().is_some());
        assert!(heat.on_time().is_none());
    }

    #[test]
    fn rebind_drives_old_line_off_first() {
        let registry = SimulatedRegistry::with_lines(["A", "B"]).with_journal();
        let mut heat = output(&registry, "A");
        let now = Instant::now();
        let _ = heat.on(now).unwrap();

        heat.rebind("B", now).unwrap();
        assert_eq!(heat.identifier(), "B");
        assert!(heat.is_off());
        assert_eq!(
            registry.journal(),
            vec![
                PinEvent::Resolved("A".into()),
                PinEvent::Write("A".into(), Level::High),
                PinEvent::Write("A".into(), Level::Low),
                PinEvent::Resolved("B".into()),
                PinEvent::Write("B".into(), Level::Low),
            ]
        );
    }

    #[test]
    fn rebind_to_empty_keeps_binding_and_forces_off() {
        let registry = SimulatedRegistry::with_lines(["A"]);
        let mut heat = output(&registry, "A");
        let now = Instant::now();
        let _ = heat.on(now).unwrap();

        heat.rebind("", now).unwrap();
        assert_eq!(heat.identifier(), "A");
        assert!(heat.is_off());
        assert!(!registry.is_high("A"));
    }

    #[test]
    fn unwired_output_only_tracks_state() {
        let registry = SimulatedRegistry::new().with_journal();
        let mut spare = output(&registry, "");
        let now = Instant::now();

        assert_eq!(spare.reset(now).unwrap(), Change::Transitioned);
        assert_eq!(spare.on(now).unwrap(), Change::Transitioned);
        assert_eq!(spare.on(now).unwrap(), Change::Unchanged);
        assert!(registry.journal().is_empty());
    }
}
