//! Audit journal for controller lifecycle events.
//!
//! Every start, controller configuration, stop, fault and rejected demand
//! is appended as one JSON line so an operator can reconstruct what the
//! actuators were told to do.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Process started and settings loaded
    SystemStart,
    /// Outputs bound and forced off for a controller
    ControllerConfigured,
    /// Control loop returned after a stop or cancellation
    ControllerStopped,
    /// Control loop ended on a fatal output fault
    ControllerFault,
    /// Manual duty cycle from settings was rejected
    DemandRejected,
    /// Process shutting down
    SystemShutdown,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic microseconds since the logger was opened
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
    opened: Instant,
}

impl AuditLogger {
    /// Open `path` in append mode, creating parent directories.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
            opened: Instant::now(),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        let unix_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        self.log(AuditEntry {
            timestamp_us: self.opened.elapsed().as_micros() as u64,
            unix_us,
            event_type,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_audit_logger_appends_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit/events.jsonl");

        let logger = AuditLogger::new(&path).unwrap();
        logger
            .log_event(
                AuditEventType::SystemStart,
                serde_json::json!({"controllers": 1}),
            )
            .unwrap();
        logger
            .log_event(
                AuditEventType::ControllerFault,
                serde_json::json!({"controller": "fermenter", "identifier": "GPIO17"}),
            )
            .unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, AuditEventType::SystemStart);

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event_type, AuditEventType::ControllerFault);
        assert_eq!(second.details["identifier"], "GPIO17");
        assert!(second.timestamp_us >= first.timestamp_us);
    }

    #[test]
    fn test_reopen_preserves_existing_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        for _ in 0..2 {
            let logger = AuditLogger::new(&path).unwrap();
            logger
                .log_event(AuditEventType::SystemShutdown, serde_json::Value::Null)
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
