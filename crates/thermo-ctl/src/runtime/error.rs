use crate::infra::store::StoreError;
use thermo_core::OutputError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no settings file given (use --config <PATH>)")]
    MissingConfig,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("controller {controller:?}: {source}")]
    Output {
        controller: String,
        #[source]
        source: OutputError,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "rpi")]
    #[error("GPIO unavailable: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}
