use thermo_core::pin_sim::{SimulatedPin, SimulatedRegistry};
use thermo_core::{Level, OutputPin, PinIoError, PinRegistry};

/// Pin backend selected at startup.
pub enum HostRegistry {
    Simulated(SimulatedRegistry),
    #[cfg(feature = "rpi")]
    Gpio(gpio::GpioRegistry),
}

pub enum HostPin {
    Simulated(SimulatedPin),
    #[cfg(feature = "rpi")]
    Gpio(gpio::GpioPin),
}

impl HostRegistry {
    /// Simulated board exposing exactly the given lines.
    pub fn simulated<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Simulated(SimulatedRegistry::with_lines(identifiers))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            #[cfg(feature = "rpi")]
            Self::Gpio(_) => "gpio",
        }
    }
}

impl PinRegistry for HostRegistry {
    type Pin = HostPin;

    fn resolve(&self, identifier: &str) -> Option<HostPin> {
        match self {
            Self::Simulated(r) => r.resolve(identifier).map(HostPin::Simulated),
            #[cfg(feature = "rpi")]
            Self::Gpio(r) => r.resolve(identifier).map(HostPin::Gpio),
        }
    }
}

impl OutputPin for HostPin {
    fn write(&mut self, level: Level) -> Result<(), PinIoError> {
        match self {
            Self::Simulated(p) => p.write(level),
            #[cfg(feature = "rpi")]
            Self::Gpio(p) => p.write(level),
        }
    }

    fn read(&self) -> Level {
        match self {
            Self::Simulated(p) => p.read(),
            #[cfg(feature = "rpi")]
            Self::Gpio(p) => p.read(),
        }
    }
}

#[cfg(feature = "rpi")]
pub mod gpio {
    //! Raspberry Pi GPIO lines through `rppal`, addressed by BCM number
    //! (`GPIO17` or `17`).

    use rppal::gpio::Gpio;
    use thermo_core::{Level, OutputPin, PinIoError, PinRegistry};
    use tracing::warn;

    pub struct GpioRegistry {
        gpio: Gpio,
    }

    impl GpioRegistry {
        pub fn new() -> Result<Self, rppal::gpio::Error> {
            Ok(Self { gpio: Gpio::new()? })
        }
    }

    pub struct GpioPin {
        pin: rppal::gpio::OutputPin,
    }

    impl PinRegistry for GpioRegistry {
        type Pin = GpioPin;

        fn resolve(&self, identifier: &str) -> Option<GpioPin> {
            let bcm = parse_bcm(identifier)?;
            match self.gpio.get(bcm) {
                Ok(pin) => Some(GpioPin {
                    pin: pin.into_output_low(),
                }),
                Err(e) => {
                    warn!(identifier, error = %e, "GPIO line unavailable");
                    None
                }
            }
        }
    }

    impl OutputPin for GpioPin {
        fn write(&mut self, level: Level) -> Result<(), PinIoError> {
            match level {
                Level::High => self.pin.set_high(),
                Level::Low => self.pin.set_low(),
            }
            Ok(())
        }

        fn read(&self) -> Level {
            if self.pin.is_set_high() {
                Level::High
            } else {
                Level::Low
            }
        }
    }

    pub(crate) fn parse_bcm(identifier: &str) -> Option<u8> {
        let trimmed = identifier.trim();
        let number = trimmed
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("gpio"))
            .map_or(trimmed, |_| &trimmed[4..]);
        number.parse().ok()
    }

}
