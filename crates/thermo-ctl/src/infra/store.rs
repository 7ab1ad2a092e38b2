//! Settings file: persistence records and their mapping to the domain model.
//!
//! Records mirror what is written to disk. They are converted into
//! [`ControllerSettings`] at this boundary so nothing past it sees storage
//! concerns such as optional fields or serde defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermo_core::demand::DEFAULT_CYCLE_TIME_SECS;
use thermo_core::{ControllerSettings, OutputBinding, ShortCycleGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPinRecord {
    pub identifier: String,
    #[serde(default)]
    pub friendly_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_output: Option<OutPinRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_output: Option<OutPinRecord>,
    #[serde(default = "default_cycle_time")]
    pub cycle_time: i64,
    #[serde(default)]
    pub min_on_secs: u64,
    #[serde(default)]
    pub min_off_secs: u64,
    /// Setting of the manual-mode calculator; fed as the initial demand.
    #[serde(default)]
    pub manual_duty_cycle: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    controllers: Vec<ControllerRecord>,
}

fn default_cycle_time() -> i64 {
    DEFAULT_CYCLE_TIME_SECS
}

impl From<&OutPinRecord> for OutputBinding {
    fn from(record: &OutPinRecord) -> Self {
        OutputBinding::new(record.identifier.trim(), record.friendly_name.as_str())
    }
}

impl From<&ControllerRecord> for ControllerSettings {
    fn from(record: &ControllerRecord) -> Self {
        ControllerSettings {
            name: record.name.clone(),
            heat: record
                .heat_output
                .as_ref()
                .map(OutputBinding::from)
                .unwrap_or_default(),
            cool: record
                .cool_output
                .as_ref()
                .map(OutputBinding::from)
                .unwrap_or_default(),
            cycle_time_secs: record.cycle_time,
            guard: ShortCycleGuard::new(
                Duration::from_secs(record.min_on_secs),
                Duration::from_secs(record.min_off_secs),
            ),
        }
    }
}

impl From<&ControllerSettings> for ControllerRecord {
    fn from(settings: &ControllerSettings) -> Self {
        let pin = |binding: &OutputBinding| {
            binding.is_wired().then(|| OutPinRecord {
                identifier: binding.identifier.clone(),
                friendly_name: binding.friendly_name.clone(),
            })
        };
        ControllerRecord {
            name: settings.name.clone(),
            heat_output: pin(&settings.heat),
            cool_output: pin(&settings.cool),
            cycle_time: settings.cycle_time_secs,
            min_on_secs: settings.guard.min_on.as_secs(),
            min_off_secs: settings.guard.min_off.as_secs(),
            manual_duty_cycle: 0,
        }
    }
}

/// JSON file holding every controller of this host.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<ControllerRecord>, StoreError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let file: SettingsFile =
            serde_json::from_str(&text).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        validate(&file.controllers)?;
        Ok(file.controllers)
    }

    pub fn save(&self, controllers: &[ControllerRecord]) -> Result<(), StoreError> {
        validate(controllers)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = SettingsFile {
            controllers: controllers.to_vec(),
        };
        let text = serde_json::to_string_pretty(&file).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, text).map_err(io_err)
    }
}

/// Records rejected here would otherwise surface as pin conflicts or
/// nonsense timing once the loops are running.
pub fn validate(controllers: &[ControllerRecord]) -> Result<(), StoreError> {
    let mut names = HashSet::new();
    let mut identifiers = HashSet::new();

    for record in controllers {
        if record.name.trim().is_empty() {
            return Err(StoreError::Invalid("controller without a name".into()));
        }
        if !names.insert(record.name.as_str()) {
            return Err(StoreError::Invalid(format!(
                "duplicate controller name {:?}",
                record.name
            )));
        }
        if record.cycle_time <= 0 {
            return Err(StoreError::Invalid(format!(
                "controller {:?}: cycle_time must be positive, got {}",
                record.name, record.cycle_time
            )));
        }
        let settings = ControllerSettings::from(record);
        for identifier in settings.identifiers() {
            if !identifiers.insert(identifier.to_string()) {
                return Err(StoreError::Invalid(format!(
                    "controller {:?}: output {:?} is already in use",
                    record.name, identifier
                )));
            }
        }
    }
    Ok(())
}

/// Example written by `--init-config`.
pub fn sample_records() -> Vec<ControllerRecord> {
    vec![ControllerRecord {
        name: "fermenter".into(),
        heat_output: Some(OutPinRecord {
            identifier: "GPIO17".into(),
            friendly_name: "Heat belt".into(),
        }),
        cool_output: Some(OutPinRecord {
            identifier: "GPIO27".into(),
            friendly_name: "Fridge compressor".into(),
        }),
        cycle_time: DEFAULT_CYCLE_TIME_SECS,
        min_on_secs: 0,
        min_off_secs: 180,
        manual_duty_cycle: 0,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sample_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested/settings.json"));

        store.save(&sample_records()).unwrap();
        assert_eq!(store.load().unwrap(), sample_records());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"controllers":[{"name":"kettle","heat_output":{"identifier":"GPIO5"}}]}"#,
        )
        .unwrap();

        let records = SettingsStore::new(&path).load().unwrap();
        let settings = ControllerSettings::from(&records[0]);
        assert_eq!(settings.heat.identifier, "GPIO5");
        assert!(!settings.cool.is_wired());
        assert_eq!(settings.cycle_time_secs, DEFAULT_CYCLE_TIME_SECS);
        assert!(settings.guard.is_disabled());
    }

    #[test]
    fn shared_output_is_rejected() {
        let mut records = sample_records();
        let mut second = records[0].clone();
        second.name = "keg".into();
        second.heat_output = None;
        records.push(second);

        let err = validate(&records).unwrap_err();
        assert!(err.to_string().contains("GPIO27"));
    }

    #[test]
    fn settings_map_back_to_records() {
        let record = &sample_records()[0];
        let settings = ControllerSettings::from(record);
        assert_eq!(settings.guard.min_off, Duration::from_secs(180));
        assert_eq!(&ControllerRecord::from(&settings), record);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = SettingsStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(err.to_string().contains("settings.json"));
    }
}
