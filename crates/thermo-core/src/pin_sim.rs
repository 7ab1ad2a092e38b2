//! In-memory pin registry for tests and dry runs.
//!
//! Lines must be declared before they can be resolved, mirroring a board
//! where only the wired pins exist. A board built with
//! [`SimulatedRegistry::with_journal`] also records every resolution and
//! write, so callers can check the order hardware was touched in. Boards
//! used for dry runs keep no history.

use crate::error::PinIoError;
use crate::pin::{Level, OutputPin, PinRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinEvent {
    Resolved(String),
    Write(String, Level),
}

#[derive(Debug)]
struct Line {
    level: Level,
    writes: u64,
    fail_writes: bool,
    // Upcoming writes that are acknowledged but leave the line untouched.
    ignored_writes: u32,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            level: Level::Low,
            writes: 0,
            fail_writes: false,
            ignored_writes: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Board {
    lines: HashMap<String, Line>,
    journal: Option<Vec<PinEvent>>,
}

impl Board {
    fn record(&mut self, event: PinEvent) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(event);
        }
    }
}

/// Simulated board. Clones share the same lines.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRegistry {
    board: Arc<Mutex<Board>>,
}

impl SimulatedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for identifier in identifiers {
            registry.add_line(identifier);
        }
        registry
    }

    /// Start recording resolutions and writes from now on.
    pub fn with_journal(self) -> Self {
        {
            let mut board = self.board();
            if board.journal.is_none() {
                board.journal = Some(Vec::new());
            }
        }
        self
    }

    pub fn add_line(&self, identifier: impl Into<String>) {
        self.board()
            .lines
            .entry(identifier.into())
            .or_default();
    }

    pub fn level(&self, identifier: &str) -> Option<Level> {
        self.board().lines.get(identifier).map(|line| line.level)
    }

    pub fn is_high(&self, identifier: &str) -> bool {
        self.level(identifier).is_some_and(Level::is_high)
    }

    pub fn write_count(&self, identifier: &str) -> u64 {
        self.board()
            .lines
            .get(identifier)
            .map_or(0, |line| line.writes)
    }

    /// Make every write to the line fail until cleared.
    pub fn fail_writes(&self, identifier: &str, fail: bool) {
        if let Some(line) = self.board().lines.get_mut(identifier) {
            line.fail_writes = fail;
        }
    }

    /// Acknowledge the next `count` writes without changing the line.
    pub fn ignore_writes(&self, identifier: &str, count: u32) {
        if let Some(line) = self.board().lines.get_mut(identifier) {
            line.ignored_writes = count;
        }
    }

    /// Change the line level behind the owner's back.
    pub fn force_level(&self, identifier: &str, level: Level) {
        if let Some(line) = self.board().lines.get_mut(identifier) {
            line.level = level;
        }
    }

    /// Recorded events, empty unless the journal was enabled.
    pub fn journal(&self) -> Vec<PinEvent> {
        self.board().journal.clone().unwrap_or_default()
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        lock(&self.board)
    }
}

impl PinRegistry for SimulatedRegistry {
    type Pin = SimulatedPin;

    fn resolve(&self, identifier: &str) -> Option<SimulatedPin> {
        let mut board = self.board();
        if !board.lines.contains_key(identifier) {
            return None;
        }
        board.record(PinEvent::Resolved(identifier.to_string()));
        Some(SimulatedPin {
            identifier: identifier.to_string(),
            board: Arc::clone(&self.board),
        })
    }
}

#[derive(Debug)]
pub struct SimulatedPin {
    identifier: String,
    board: Arc<Mutex<Board>>,
}

impl OutputPin for SimulatedPin {
    fn write(&mut self, level: Level) -> Result<(), PinIoError> {
        let mut board = lock(&self.board);
        let Some(line) = board.lines.get_mut(&self.identifier) else {
            return Err(PinIoError::new("line removed"));
        };
        if line.fail_writes {
            return Err(PinIoError::new("simulated write fault"));
        }
        line.writes += 1;
        if line.ignored_writes > 0 {
            line.ignored_writes -= 1;
        } else {
            line.level = level;
        }
        board.record(PinEvent::Write(self.identifier.clone(), level));
        Ok(())
    }

    fn read(&self) -> Level {
        lock(&self.board)
            .lines
            .get(&self.identifier)
            .map_or(Level::Low, |line| line.level)
    }
}

fn lock(board: &Mutex<Board>) -> MutexGuard<'_, Board> {
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
