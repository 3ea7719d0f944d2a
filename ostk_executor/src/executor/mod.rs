//! # Isolated Task Executor
//!
//! Runs one operation at a time in a child process and exposes three calls:
//!
//! - [`TaskExecutor::start`] spawns the child and returns immediately.
//! - [`TaskExecutor::poll`] drains whatever events have arrived and returns a
//!   [`Snapshot`]. It never waits.
//! - [`TaskExecutor::cancel`] cancels in stages: cooperative flag, remote
//!   cancellation of the server-side query (if its id is known), then
//!   termination of the child with a grace period followed by a kill.
//!
//! Every task ends in exactly one of `Success`, `NoData`, `Failure` or
//! `Cancelled`. A child that dies without reporting a result is noticed by
//! `poll` and recorded as a failure (or as cancelled, if a cancellation was in
//! flight).

mod phase;
mod process;
mod task;
mod types;

pub use phase::{Phase, detect as detect_phase};
pub use types::{CancelReport, OperationSpec, Snapshot, TaskResult, Termination};

use crate::config::ExecutorConfig;
use crate::constants::messages;
use crate::error::{ExecutorError, Result};
use crate::remote::{QueryCanceller, TrinoCancelClient};
use ostk_common::{ControlMessage, Parameters, Records, TaskRequest, TaskState};
use process::IsolatedProcess;
use std::sync::Arc;
use task::Task;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{info, warn};

/// Owner of at most one task and its isolated execution context.
///
/// All methods take `&mut self`; share an executor behind a
/// `tokio::sync::Mutex` if several callers need it.
pub struct TaskExecutor {
    config: ExecutorConfig,
    canceller: Option<Arc<dyn QueryCanceller>>,
    task: Option<Task>,
    process: Option<IsolatedProcess>,
}

impl TaskExecutor {
    /// Executor without remote cancellation.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            canceller: None,
            task: None,
            process: None,
        }
    }

    /// Executor with the HTTP cancellation client described by `config`, if enabled.
    pub fn from_config(config: ExecutorConfig) -> Self {
        let canceller: Option<Arc<dyn QueryCanceller>> = if config.remote_cancel.enabled {
            match TrinoCancelClient::from_config(&config.remote_cancel) {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    warn!("Remote cancellation disabled: {}", err);
                    None
                }
            }
        } else {
            None
        };
        Self {
            canceller,
            ..Self::new(config)
        }
    }

    pub fn with_canceller(mut self, canceller: Arc<dyn QueryCanceller>) -> Self {
        self.canceller = Some(canceller);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn has_canceller(&self) -> bool {
        self.canceller.is_some()
    }

    /// Start `spec` with `parameters` and return without waiting for it.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`ExecutorError::AlreadyRunning`] while another task is active; that
    /// task is not affected.
    pub fn start(&mut self, spec: OperationSpec, parameters: Parameters) -> Result<()> {
        // A task that finished since the last poll must not block a new start.
        self.refresh();
        if self.is_active() {
            warn!(
                "Rejected start of '{}': a task is already running",
                spec.operation()
            );
            return Err(ExecutorError::AlreadyRunning);
        }

        let request = TaskRequest::new(spec.operation(), parameters.clone());
        let process = IsolatedProcess::spawn(&spec, &request)?;
        info!(
            "Started operation '{}' in pid {:?}",
            spec.operation(),
            process.pid()
        );

        self.task = Some(Task::new(
            spec.operation(),
            parameters,
            &self.config.executor,
        ));
        self.process = Some(process);
        Ok(())
    }

    /// Drain pending events and report the current state. Never waits.
    pub fn poll(&mut self) -> Snapshot {
        self.refresh();
        self.snapshot()
    }

    /// Current state without draining anything.
    pub fn snapshot(&self) -> Snapshot {
        self.task
            .as_ref()
            .map(Task::snapshot)
            .unwrap_or_else(Snapshot::idle)
    }

    /// Cancel the running task.
    ///
    /// Waits at most for the remote cancellation timeout plus the termination
    /// grace period. Cancelling an already cancelled task succeeds without
    /// doing anything; with no running task this fails with
    /// [`ExecutorError::NoTaskRunning`].
    pub async fn cancel(&mut self) -> Result<CancelReport> {
        // Pick up a query id (or a result) that arrived since the last poll.
        self.refresh();
        self.settle_held();
        let grace = self.config.executor.termination_grace();
        let canceller = self.canceller.clone();

        let (Some(task), Some(process)) = (self.task.as_mut(), self.process.as_mut()) else {
            return Err(ExecutorError::NoTaskRunning);
        };
        match task.state() {
            TaskState::Running => {}
            TaskState::Cancelled => {
                task.log(messages::QUERY_CANCELLED);
                return Ok(CancelReport::already_cancelled());
            }
            _ => return Err(ExecutorError::NoTaskRunning),
        }

        info!("Cancelling operation '{}'", task.operation());
        task.request_cancel();
        process.send_control(ControlMessage::Cancel);

        let remote = match (task.remote_query_id().map(str::to_owned), canceller) {
            (Some(query_id), Some(canceller)) => {
                task.log(format!("Cancelling remote query {query_id}..."));
                let outcome = canceller.cancel_query(&query_id).await;
                task.log(outcome.to_string());
                Some(outcome)
            }
            (Some(_), None) => {
                task.log(messages::NO_CANCELLER);
                None
            }
            (None, _) => {
                task.log(messages::NO_QUERY_ID);
                None
            }
        };

        let termination = process.terminate(grace).await;
        info!("Operation '{}' terminated: {:?}", task.operation(), termination);
        task.log(messages::PROCESS_TERMINATED);
        task.finish(TaskResult::cancelled());

        Ok(CancelReport {
            already_cancelled: false,
            remote,
            termination: Some(termination),
        })
    }

    /// Whether a task is currently running.
    pub fn is_active(&self) -> bool {
        self.state().is_running()
    }

    pub fn state(&self) -> TaskState {
        self.task.as_ref().map(Task::state).unwrap_or_default()
    }

    pub fn remote_query_id(&self) -> Option<&str> {
        self.task.as_ref().and_then(Task::remote_query_id)
    }

    /// Parameters of the current (or last) task.
    pub fn parameters(&self) -> Option<&Parameters> {
        self.task.as_ref().map(Task::parameters)
    }

    /// Records of the last successful task.
    pub fn last_result(&self) -> Option<&Records> {
        self.task.as_ref().and_then(Task::records)
    }

    pub fn take_last_result(&mut self) -> Option<Records> {
        self.task.as_mut().and_then(Task::take_records)
    }

    /// Drain the event channel and detect a silently dead child.
    ///
    /// A reported result is applied once the child's output has been read to
    /// the end, or `exit_drain_grace` after it arrived. The child is stopped
    /// at that point if it is still running.
    fn refresh(&mut self) {
        let drain_grace = self.config.executor.exit_drain_grace();
        let (Some(task), Some(process)) = (self.task.as_mut(), self.process.as_mut()) else {
            return;
        };
        if !task.state().is_running() {
            return;
        }

        // Sample the exit status and the pipes before draining, so everything
        // the child wrote before exiting is seen before it is declared dead.
        let exit = process.poll_exit();
        let output_closed = process.output_closed();

        let disconnected = loop {
            match process.try_next() {
                Ok(event) if event.is_terminal() => process.hold(event),
                Ok(event) => task.apply(event),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };

        if let Some(held_for) = process.held_for() {
            if output_closed || disconnected || held_for >= drain_grace {
                settle(task, process);
            }
            return;
        }

        if let Some((status, since_exit)) = exit
            && (disconnected || since_exit >= drain_grace)
        {
            let result = if task.cancel_requested() {
                TaskResult::cancelled()
            } else {
                TaskResult::failure(format!(
                    "{} ({status})",
                    messages::UNEXPECTED_TERMINATION
                ))
            };
            warn!(
                "Operation '{}' exited without a result ({})",
                task.operation(),
                status
            );
            task.finish(result);
        }
    }

    /// Apply a result that is still being held back, without waiting for the
    /// rest of the output.
    fn settle_held(&mut self) {
        if let (Some(task), Some(process)) = (self.task.as_mut(), self.process.as_mut())
            && task.state().is_running()
            && process.held_for().is_some()
        {
            settle(task, process);
        }
    }
}

fn settle(task: &mut Task, process: &mut IsolatedProcess) {
    if let Some(event) = process.take_held() {
        task.apply(event);
    }
    process.stop();
}

/// JSON response for a `start` call: `{"started": true}` or `{"error": ..}`.
pub fn start_response(result: &Result<()>) -> serde_json::Value {
    match result {
        Ok(()) => serde_json::json!({ "started": true }),
        Err(err) => err.to_response(),
    }
}

/// JSON response for a `cancel` call: `{"success": true, ..}` or `{"error": ..}`.
pub fn cancel_response(result: &Result<CancelReport>) -> serde_json::Value {
    match result {
        Ok(report) => report.to_response(),
        Err(err) => err.to_response(),
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("state", &self.state())
            .field("remote_query_id", &self.remote_query_id())
            .field("has_canceller", &self.has_canceller())
            .finish()
    }
}
