use crate::demand::DEFAULT_CYCLE_TIME_SECS;
use crate::guard::ShortCycleGuard;

/// Which line an output is wired to and what to call it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBinding {
    /// Empty when that side of the controller is not wired.
    pub identifier: String,
    pub friendly_name: String,
}

impl OutputBinding {
    pub fn new(identifier: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            friendly_name: friendly_name.into(),
        }
    }

    pub fn is_wired(&self) -> bool {
        !self.identifier.is_empty()
    }
}

/// Stored configuration of one physical controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub name: String,
    pub heat: OutputBinding,
    pub cool: OutputBinding,
    pub cycle_time_secs: i64,
    pub guard: ShortCycleGuard,
}

impl ControllerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heat: OutputBinding::default(),
            cool: OutputBinding::default(),
            cycle_time_secs: DEFAULT_CYCLE_TIME_SECS,
            guard: ShortCycleGuard::default(),
        }
    }

    /// Identifiers of every wired output.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        [&self.heat, &self.cool]
            .into_iter()
            .filter(|binding| binding.is_wired())
            .map(|binding| binding.identifier.as_str())
    }
}
