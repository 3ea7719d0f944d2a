//! # Worker Runtime
//!
//! Child-side half of the executor protocol. A worker process:
//!
//! 1. keeps the stdout pipe for frames and sends fd 1 to stderr,
//! 2. reads one [`TaskRequest`] line from stdin,
//! 3. listens for [`ControlMessage`] lines on a background thread
//!    (`Cancel` sets the cooperative flag, `Terminate` exits at once, and a
//!    closed stdin counts as `Cancel`),
//! 4. routes `tracing` output through [`InterceptLayer`],
//! 5. runs the named [`Operation`] with panics caught,
//! 6. writes exactly one terminal event and exits.
//!
//! Any binary can become a worker by calling [`run_worker`] with its own
//! [`OperationRegistry`].

pub mod builtin;
mod context;
mod layer;
mod operation;

pub use context::{FrameWriter, TaskContext};
pub use layer::InterceptLayer;
pub use operation::{Operation, OperationRegistry};

use crate::constants::TERMINATED_EXIT_CODE;
use crate::interceptor::{EventSink, OutputInterceptor};
use anyhow::{Context, Result};
use ostk_common::{ControlMessage, Event, ProtocolError, TaskRequest};
use std::any::Any;
use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Environment variable controlling which worker log records are forwarded.
pub const WORKER_LOG_ENV: &str = "OSTK_WORKER_LOG";

/// Run the worker protocol over stdin/stdout until the operation finishes.
pub fn run_worker(registry: &OperationRegistry) -> Result<()> {
    let sink = FrameWriter::private_stdout().context("Failed to reserve stdout for frames")?;
    let mut input = std::io::BufReader::new(std::io::stdin());
    let request = read_request(&mut input).context("Failed to read task request")?;

    let cancellation = CancellationToken::new();
    let listener_token = cancellation.clone();
    std::thread::Builder::new()
        .name("ostk-worker-control".into())
        .spawn(move || {
            if listen_for_control(input, &listener_token) == ListenerExit::Terminate {
                std::process::exit(TERMINATED_EXIT_CODE);
            }
        })
        .context("Failed to start control listener")?;

    install_intercept_layer(sink.clone());

    let ctx = TaskContext::new(sink.clone(), cancellation);
    let event = execute(registry, &request, &ctx);
    sink.emit(event);
    Ok(())
}

/// Read the task request line.
pub fn read_request(input: &mut impl BufRead) -> Result<TaskRequest, ProtocolError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(ProtocolError::MissingRequest);
    }
    TaskRequest::from_line(&line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// The executor asked the worker to exit.
    Terminate,
    /// stdin was closed or became unreadable.
    Closed,
}

/// Apply control messages until `Terminate` or end of input.
///
/// A closed control channel means the executor is gone, so the cooperative
/// flag is set in that case too.
pub fn listen_for_control(input: impl BufRead, cancellation: &CancellationToken) -> ListenerExit {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match ControlMessage::from_line(&line) {
            Some(ControlMessage::Cancel) => {
                tracing::debug!("Cancellation requested by executor");
                cancellation.cancel();
            }
            Some(ControlMessage::Terminate) => {
                cancellation.cancel();
                return ListenerExit::Terminate;
            }
            None => {}
        }
    }
    cancellation.cancel();
    ListenerExit::Closed
}

/// Route this process's `tracing` records to `sink`. No-op if a subscriber is already set.
pub fn install_intercept_layer(sink: FrameWriter) {
    let filter =
        EnvFilter::try_from_env(WORKER_LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(InterceptLayer::new(OutputInterceptor::new(sink)))
        .try_init();
}

/// Run `request` against `registry` and return the terminal event.
pub fn execute(registry: &OperationRegistry, request: &TaskRequest, ctx: &TaskContext) -> Event {
    let Some(operation) = registry.get(&request.operation) else {
        return Event::failure(format!("unknown operation '{}'", request.operation));
    };

    tracing::info!("Running {}", operation.name());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        operation.run(&request.parameters, ctx)
    }));

    match outcome {
        Ok(Ok(Some(records))) if !records.is_empty() => {
            tracing::info!("Retrieved {} rows", format_count(records.row_count()));
            Event::Success { payload: records }
        }
        Ok(Ok(_)) => {
            tracing::info!("Query returned no rows");
            Event::NoData
        }
        Ok(Err(err)) => Event::failure(format!("{err:#}")),
        Err(payload) => Event::failure(format!(
            "operation panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `1234567` -> `1,234,567`
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
