use crate::constants::{messages, status};
use crate::remote::RemoteCancelOutcome;
use crate::utils::time;
use ostk_common::TaskState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How to launch the isolated execution context for one operation.
///
/// The program receives a [`ostk_common::TaskRequest`] naming `operation` on
/// its stdin. Programs that ignore the protocol still work; their output is
/// treated as plain log text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    operation: String,
}

impl OperationSpec {
    pub fn new(program: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            operation: operation.into(),
        }
    }

    /// Run `operation` in a worker started from the current executable.
    pub fn current_exe(operation: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, operation).arg("worker"))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn program_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn envs(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.envs.iter().map(|(k, v)| (k, v))
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskResult {
    Success {
        row_count: usize,
        columns: Vec<String>,
    },
    /// A well-formed empty result; not an error.
    NoData { message: String },
    Failure { error: String },
    Cancelled { message: String },
}

impl TaskResult {
    pub fn no_data() -> Self {
        TaskResult::NoData {
            message: status::NO_DATA.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        TaskResult::Cancelled {
            message: messages::QUERY_CANCELLED.to_string(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        TaskResult::Failure {
            error: error.into(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            TaskResult::Success { .. } => TaskState::Success,
            TaskResult::NoData { .. } => TaskState::NoData,
            TaskResult::Failure { .. } => TaskState::Failure,
            TaskResult::Cancelled { .. } => TaskState::Cancelled,
        }
    }

    /// Error text, present only for failures.
    pub fn error(&self) -> Option<&str> {
        match self {
            TaskResult::Failure { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }

    /// Human-readable summary.
    pub fn describe(&self) -> String {
        match self {
            TaskResult::Success { row_count, .. } => format!("Complete: {row_count} rows"),
            TaskResult::NoData { message } | TaskResult::Cancelled { message } => message.clone(),
            TaskResult::Failure { error } => format!("Error: {error}"),
        }
    }
}

/// Immutable view of the current task returned by `poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: TaskState,
    pub is_executing: bool,
    #[serde(rename = "status")]
    pub status_message: String,
    /// Most recent log lines, oldest first.
    #[serde(rename = "logs")]
    pub recent_log_lines: Vec<String>,
    /// Lines ever logged for this task, including ones no longer retained.
    pub total_log_lines: u64,
    pub complete: bool,
    pub result: Option<TaskResult>,
    pub can_cancel: bool,
    pub query_id: Option<String>,
    #[serde(with = "time::option", default)]
    pub started_at: Option<SystemTime>,
    #[serde(with = "time::option", default)]
    pub finished_at: Option<SystemTime>,
}

impl Snapshot {
    /// Snapshot of an executor that has never started a task.
    pub fn idle() -> Self {
        Self {
            state: TaskState::Idle,
            is_executing: false,
            status_message: String::new(),
            recent_log_lines: Vec::new(),
            total_log_lines: 0,
            complete: false,
            result: None,
            can_cancel: false,
            query_id: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// How the isolated execution context ended during cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "termination", rename_all = "snake_case")]
pub enum Termination {
    /// It had already exited before termination was requested.
    AlreadyExited { code: Option<i32> },
    /// It exited within the grace period.
    Exited { code: Option<i32> },
    /// It had to be killed.
    Killed,
}

/// What `cancel` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReport {
    /// The task was already cancelled; nothing else happened.
    pub already_cancelled: bool,
    /// Answer of the remote service, when a remote cancellation was attempted.
    pub remote: Option<RemoteCancelOutcome>,
    pub termination: Option<Termination>,
}

impl CancelReport {
    pub(crate) fn already_cancelled() -> Self {
        Self {
            already_cancelled: true,
            remote: None,
            termination: None,
        }
    }

    /// `{"success": true, ...}` with the report fields merged in.
    pub fn to_response(&self) -> Value {
        let mut response = Map::new();
        response.insert("success".into(), Value::Bool(true));
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            response.extend(fields);
        }
        Value::Object(response)
    }
}
