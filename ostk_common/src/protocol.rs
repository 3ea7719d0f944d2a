//! Messages travelling from the executor to a worker over its stdin.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque operation parameters, immutable for the lifetime of a task.
pub type Parameters = Map<String, Value>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker received no task request before stdin closed")]
    MissingRequest,
}

/// First line written to a worker's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Name of the operation the worker should look up and run.
    pub operation: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl TaskRequest {
    pub fn new(operation: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            operation: operation.into(),
            parameters,
        }
    }

    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

/// Control lines that follow the [`TaskRequest`] on a worker's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Set the cooperative cancellation flag; the operation may stop on its own.
    Cancel,
    /// Exit immediately.
    Terminate,
}

impl ControlMessage {
    pub fn to_line(self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(&self)?;
        line.push('\n');
        Ok(line)
    }

    /// Unknown or malformed control lines are ignored by the worker.
    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}
