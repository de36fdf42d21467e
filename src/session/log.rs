use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of retained log entries
pub const LOG_CAPACITY: usize = 100;

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

/// One user-facing activity log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    /// Wall-clock time of insertion, formatted as HH:MM:SS
    pub time: String,
}

/// Bounded activity log
///
/// Keeps the `LOG_CAPACITY` most recent entries in arrival order; the
/// oldest entry is evicted first. Appending never fails.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    appended: u64,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, stamping it with the current local time
    pub fn append(&mut self, kind: LogKind, message: impl Into<String>) {
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            kind,
            message: message.into(),
            time: Local::now().format("%H:%M:%S").to_string(),
        });
        self.appended += 1;
    }

    /// Entries oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries ever appended; monotonic across evictions and `clear`,
    /// which lets consumers tail the log without missing or repeating entries
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
