use crate::demand::DemandViolation;
use thiserror::Error;

/// Failure reported by the underlying pin write primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PinIoError(pub String);

impl PinIoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Faults the output layer cannot recover from on its own.
///
/// Pin faults leave a thermal actuator in an unknown state, so callers are
/// expected to stop the owning control loop and surface the identifier.
/// Rejected settings are reported before any output is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("no output pin named {identifier:?}")]
    Unresolved { identifier: String },

    #[error("write to output pin {identifier:?} failed: {source}")]
    WriteFailed {
        identifier: String,
        #[source]
        source: PinIoError,
    },

    #[error("rejected controller settings: {source}")]
    InvalidSettings {
        #[source]
        source: DemandViolation,
    },
}

impl OutputError {
    /// Output line the fault concerns, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Unresolved { identifier } | Self::WriteFailed { identifier, .. } => {
                Some(identifier)
            }
            Self::InvalidSettings { .. } => None,
        }
    }
}

pub type OutputResult<T> = Result<T, OutputError>;
