use ostk_common::ProtocolError;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced by [`crate::executor::TaskExecutor`].
///
/// Operation failures are never reported through this type; they become the
/// task's terminal result instead.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("already running")]
    AlreadyRunning,

    #[error("no task running")]
    NoTaskRunning,

    #[error("failed to launch execution context '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ExecutorError {
    /// Re-entrancy errors are expected in normal use; the rest point at a broken setup.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExecutorError::AlreadyRunning | ExecutorError::NoTaskRunning)
    }

    pub fn error_category(&self) -> &'static str {
        match self {
            ExecutorError::AlreadyRunning | ExecutorError::NoTaskRunning => "rejected",
            ExecutorError::Launch { .. } => "launch",
            ExecutorError::Protocol(_) => "protocol",
        }
    }

    /// Structured response for collaborators that speak JSON.
    pub fn to_response(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages_match_response_contract() {
        assert_eq!(
            ExecutorError::AlreadyRunning.to_response(),
            json!({"error": "already running"})
        );
        assert_eq!(
            ExecutorError::NoTaskRunning.to_response(),
            json!({"error": "no task running"})
        );
        assert!(ExecutorError::AlreadyRunning.is_rejection());
    }

    #[test]
    fn launch_error_names_the_program() {
        let err = ExecutorError::Launch {
            program: "/missing/worker".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/missing/worker"));
        assert_eq!(err.error_category(), "launch");
        assert!(!err.is_rejection());
    }
}
