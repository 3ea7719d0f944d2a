//! Phase detection from free-form log text.
//!
//! Retrieval libraries do not report their phase explicitly, so the executor
//! recognises a few well-known log lines and turns them into coarser status
//! messages. This is a heuristic; unknown lines leave the status untouched.

use crate::constants::status;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Results are being written to the local cache.
    Caching,
    /// Rows are back and being post-processed.
    Processing,
}

impl Phase {
    pub fn status(&self) -> &'static str {
        match self {
            Phase::Caching => status::SAVING,
            Phase::Processing => status::PROCESSING,
        }
    }
}

fn processing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(retrieved|preparing)\s+[\d,]+\s+rows\b")
            .expect("processing phase regex must compile")
    })
}

pub fn detect(line: &str) -> Option<Phase> {
    if line.contains("Saving results to") {
        Some(Phase::Caching)
    } else if processing_pattern().is_match(line) {
        Some(Phase::Processing)
    } else {
        None
    }
}
