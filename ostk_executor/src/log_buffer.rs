//! # Task Log Buffer
//!
//! Bounded, ordered storage for the log lines of one task, plus redaction of
//! credentials that operations sometimes echo into their output.
//!
//! - [`LogRingBuffer`]: keeps the most recent lines in arrival order and counts
//!   every line ever pushed, so pollers can tell how many are new.
//! - [`redact_sensitive_line`]: masks bearer tokens, authorization headers and
//!   `key=value` secrets before a line is stored or shown.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants::DEFAULT_LOG_RETENTION;

const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

fn redaction_rules() -> &'static Vec<(Regex, &'static str)> {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)\bAuthorization\b\s*:\s*\S+\s+\S+")
                    .expect("authorization header redaction regex must compile"),
                "Authorization: [REDACTED]",
            ),
            (
                Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._+/=-]{8,}")
                    .expect("bearer redaction regex must compile"),
                "Bearer [REDACTED]",
            ),
            (
                Regex::new(
                    r"(?i)\b(password|passwd|token|access_token|refresh_token|secret|client_secret)\b\s*[:=]\s*(\S+)",
                )
                .expect("key-value secret redaction regex must compile"),
                "$1=[REDACTED]",
            ),
            (
                Regex::new(r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]+")
                    .expect("jwt redaction regex must compile"),
                REDACTION_PLACEHOLDER,
            ),
        ]
    })
}

/// Redact common secret/token patterns from a single output line.
pub fn redact_sensitive_line(line: &str) -> String {
    let mut redacted = line.to_owned();
    for (pattern, replacement) in redaction_rules() {
        redacted = pattern.replace_all(&redacted, *replacement).into_owned();
    }
    redacted
}

// ---------------------------------------------------------------------------
// LogRingBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity buffer for the most recent log lines of a task.
///
/// Older lines are evicted in FIFO order when the buffer is full; ordering of
/// the retained lines is never changed.
#[derive(Debug, Clone)]
pub struct LogRingBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
}

impl LogRingBuffer {
    /// Create an empty buffer holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Append a line, evicting the oldest one at capacity.
    pub fn push(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    /// Retained lines, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    /// Number of lines currently retained.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines ever pushed, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_RETENTION)
    }
}
