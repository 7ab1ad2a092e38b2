use crate::error::PinIoError;
use serde::Serialize;

/// Electrical level of a digital output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// A resolved hardware output line.
///
/// `read` reports the level the line is actually driving, which is what the
/// output layer checks after every write.
pub trait OutputPin: Send {
    fn write(&mut self, level: Level) -> Result<(), PinIoError>;
    fn read(&self) -> Level;
}

/// Resolves a named line to an exclusively owned pin handle.
///
/// Returns `None` when no line with that name exists.
pub trait PinRegistry: Send + Sync {
    type Pin: OutputPin;

    fn resolve(&self, identifier: &str) -> Option<Self::Pin>;
}
