//! Per-session diagnostic log
//!
//! A small bounded ring of lifecycle lines (connects, reconnect attempts,
//! transfer outcomes) shown in the session's info panel. The bound is an
//! explicit invariant: the ring never holds more than [`MAX_LOG_LINES`].

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Maximum lines kept per session
pub const MAX_LOG_LINES: usize = 160;

/// One log line with capture timestamp (Unix milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub text: String,
    pub timestamp: i64,
}

/// Bounded ring of session log lines
pub struct SessionLog {
    lines: Mutex<VecDeque<LogLine>>,
    max_lines: usize,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_LINES)
    }

    pub fn with_capacity(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            max_lines,
        }
    }

    /// Append a line, dropping the oldest if at capacity.
    pub fn push(&self, text: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(LogLine {
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    /// Snapshot of the current lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}
