pub mod clock;
pub mod control;
pub mod control_loop;
pub mod demand;
pub mod error;
mod exclusion_proptest;
pub mod guard;
pub mod output;
pub mod pin;
#[cfg(any(test, feature = "simulation"))]
pub mod pin_sim;
pub mod settings;
pub mod signal;
pub mod tags;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{ControlStatus, OutputControl, OutputStatus, TickReport};
pub use control_loop::{ControlLoop, ExecutionStats, LoopConfig, OutputController};
pub use demand::{Demand, DemandViolation, Unvalidated, Validated};
pub use error::{OutputError, OutputResult, PinIoError};
pub use guard::ShortCycleGuard;
pub use output::{Change, DigitalOutput, OutputState};
pub use pin::{Level, OutputPin, PinRegistry};
#[cfg(any(test, feature = "simulation"))]
pub use pin_sim::{PinEvent, SimulatedRegistry};
pub use settings::{ControllerSettings, OutputBinding};
pub use signal::ShutdownSignal;
