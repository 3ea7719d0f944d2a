use super::phase;
use super::types::{Snapshot, TaskResult};
use crate::config::TaskSettings;
use crate::constants::{messages, status};
use crate::log_buffer::{LogRingBuffer, redact_sensitive_line};
use ostk_common::{Event, Parameters, Records, TaskState};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Aggregated view of one execution attempt, owned by the executor.
#[derive(Debug)]
pub(crate) struct Task {
    operation: String,
    parameters: Parameters,
    state: TaskState,
    remote_query_id: Option<String>,
    logs: LogRingBuffer,
    status_message: String,
    result: Option<TaskResult>,
    records: Option<Records>,
    cancel_requested: bool,
    started_at: SystemTime,
    finished_at: Option<SystemTime>,
    status_max_chars: usize,
}

impl Task {
    pub(crate) fn new(operation: &str, parameters: Parameters, settings: &TaskSettings) -> Self {
        let mut task = Self {
            operation: operation.to_string(),
            parameters,
            state: TaskState::Running,
            remote_query_id: None,
            logs: LogRingBuffer::new(settings.log_retention),
            status_message: String::new(),
            result: None,
            records: None,
            cancel_requested: false,
            started_at: SystemTime::now(),
            finished_at: None,
            status_max_chars: settings.status_max_chars,
        };
        task.set_status(status::CONNECTING);
        task.log(format!("Starting {operation}"));
        task
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn operation(&self) -> &str {
        &self.operation
    }

    pub(crate) fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub(crate) fn remote_query_id(&self) -> Option<&str> {
        self.remote_query_id.as_deref()
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn records(&self) -> Option<&Records> {
        self.records.as_ref()
    }

    pub(crate) fn take_records(&mut self) -> Option<Records> {
        self.records.take()
    }

    pub(crate) fn log(&mut self, line: impl AsRef<str>) {
        self.logs.push(redact_sensitive_line(line.as_ref()));
    }

    fn set_status(&mut self, text: &str) {
        let redacted = redact_sensitive_line(text.trim());
        self.status_message = redacted.chars().take(self.status_max_chars).collect();
    }

    /// Fold one event into the aggregate. Events after a terminal state are ignored.
    pub(crate) fn apply(&mut self, event: Event) {
        if self.state.is_terminal() {
            debug!("Ignoring event after terminal state {}: {}", self.state, event);
            return;
        }

        match event {
            Event::QueryIdCaptured { id } => {
                if self.remote_query_id.is_some() {
                    debug!("Ignoring additional query id {}", id);
                    return;
                }
                info!("Operation '{}' is remote query {}", self.operation, id);
                self.log(format!("Query ID: {id}"));
                self.set_status(status::FETCHING);
                self.remote_query_id = Some(id);
            }
            Event::ProgressUpdate { text } => self.set_status(&text),
            Event::LogLine { text } => {
                if let Some(phase) = phase::detect(&text) {
                    self.set_status(phase.status());
                }
                self.log(text);
            }
            Event::Success { payload } if payload.is_empty() => {
                self.finish(TaskResult::no_data());
            }
            Event::Success { payload } => {
                let result = TaskResult::Success {
                    row_count: payload.row_count(),
                    columns: payload.columns.clone(),
                };
                self.records = Some(payload);
                self.finish(result);
            }
            Event::NoData => {
                self.finish(TaskResult::no_data());
            }
            Event::Failure { message } => {
                self.finish(TaskResult::failure(message));
            }
        }
    }

    /// Record the cooperative cancellation request.
    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
        self.log(messages::CANCEL_REQUESTED);
        self.set_status(status::CANCELLING);
    }

    /// Move to the terminal state implied by `result`. Returns `false` if the
    /// task already finished; the first result always wins.
    pub(crate) fn finish(&mut self, result: TaskResult) -> bool {
        let next = result.state();
        if !self.state.can_transition_to(next) {
            warn!(
                "Ignoring transition {} -> {} for operation '{}'",
                self.state, next, self.operation
            );
            return false;
        }

        match &result {
            TaskResult::Success { row_count, .. } => {
                self.log(format!("Query completed: {row_count} rows"));
            }
            TaskResult::NoData { message } => self.log(message),
            TaskResult::Failure { error } => self.log(format!("Error: {error}")),
            TaskResult::Cancelled { message } => self.log(message),
        }
        let summary = match &result {
            TaskResult::Cancelled { .. } => status::CANCELLED.to_string(),
            other => other.describe(),
        };
        self.set_status(&summary);

        info!(
            "Operation '{}' finished as {} after {:?}",
            self.operation,
            next,
            self.started_at.elapsed().unwrap_or_default()
        );
        self.state = next;
        self.result = Some(result);
        self.finished_at = Some(SystemTime::now());
        true
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let running = self.state.is_running();
        Snapshot {
            state: self.state,
            is_executing: running,
            status_message: self.status_message.clone(),
            recent_log_lines: self.logs.recent(),
            total_log_lines: self.logs.total(),
            complete: self.state.is_terminal(),
            result: self.result.clone(),
            can_cancel: running && self.remote_query_id.is_some(),
            query_id: self.remote_query_id.clone(),
            started_at: Some(self.started_at),
            finished_at: self.finished_at,
        }
    }
}
