//! Built-in operations for diagnostics and end-to-end checks.
//!
//! They simulate the shapes a real retrieval takes (log chatter, progress
//! redraws, a remote query id, rows or no rows, errors, hangs, crashes)
//! without talking to any remote service.

use super::{Operation, OperationRegistry, TaskContext};
use crate::correlator::RemoteResponse;
use anyhow::{Context, Result, bail};
use ostk_common::{Parameters, Records};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

/// Registry with every built-in operation.
pub fn registry() -> OperationRegistry {
    OperationRegistry::new()
        .with(Emit)
        .with(Hang)
        .with(Sleep)
        .with(Fail)
        .with(Panic)
        .with(Exit)
        .with(Ambient)
}

fn parse<T: DeserializeOwned>(parameters: &Parameters) -> Result<T> {
    serde_json::from_value(Value::Object(parameters.clone())).context("Invalid parameters")
}

/// Response of a pretend remote engine.
struct SimulatedResponse {
    query_id: Option<String>,
    rows: Vec<Map<String, Value>>,
}

impl RemoteResponse for SimulatedResponse {
    fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Script {
    /// Lines written through the ambient writer.
    lines: Vec<String>,
    /// Lines logged through `tracing`.
    log: Vec<String>,
    /// Progress redraws, written with a leading `\r`.
    progress: Vec<String>,
    query_id: Option<String>,
    /// Pause between steps.
    delay_ms: u64,
    rows: Option<Vec<Map<String, Value>>>,
}

impl Script {
    fn pause(&self) {
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms));
        }
    }

    /// Play the script and return the rows it carried.
    fn play(self, ctx: &TaskContext) -> Result<Option<Vec<Map<String, Value>>>> {
        let mut out = ctx.output();
        for line in &self.lines {
            writeln!(out, "{line}")?;
            self.pause();
        }
        for line in &self.log {
            tracing::info!("{}", line);
            self.pause();
        }
        for step in &self.progress {
            write!(out, "\r{step}")?;
            self.pause();
        }

        let response = SimulatedResponse {
            query_id: self.query_id.clone(),
            rows: self.rows.clone().unwrap_or_default(),
        };
        let mut process = ctx.correlator().wrap(|response: SimulatedResponse| response.rows);
        let rows = process(response);
        Ok(self.rows.map(|_| rows))
    }
}

/// Plays a script and returns its rows.
struct Emit;

impl Operation for Emit {
    fn name(&self) -> &str {
        "emit"
    }

    fn description(&self) -> &str {
        "Emit scripted lines, logs, progress and an optional query id, then return the given rows"
    }

    fn run(&self, parameters: &Parameters, ctx: &TaskContext) -> Result<Option<Records>> {
        let script: Script = parse(parameters)?;
        Ok(script.play(ctx)?.map(Records::from_rows))
    }
}

/// Plays a script, then blocks forever, ignoring cooperative cancellation.
struct Hang;

impl Operation for Hang {
    fn name(&self) -> &str {
        "hang"
    }

    fn description(&self) -> &str {
        "Emit a script, then block forever without checking for cancellation"
    }

    fn run(&self, parameters: &Parameters, ctx: &TaskContext) -> Result<Option<Records>> {
        let script: Script = parse(parameters)?;
        script.play(ctx)?;
        loop {
            thread::sleep(Duration::from_secs(3600));
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SleepParams {
    seconds: f64,
}

impl Default for SleepParams {
    fn default() -> Self {
        Self { seconds: 30.0 }
    }
}

/// Sleeps, checking the cooperative cancellation flag.
struct Sleep;

impl Operation for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleep for `seconds`, stopping early when cancellation is requested"
    }

    fn run(&self, parameters: &Parameters, ctx: &TaskContext) -> Result<Option<Records>> {
        let params: SleepParams = parse(parameters)?;
        let deadline = Instant::now() + Duration::from_secs_f64(params.seconds.max(0.0));
        while Instant::now() < deadline {
            if ctx.is_cancelled() {
                bail!("cancelled by request");
            }
            thread::sleep(Duration::from_millis(50));
        }
        Ok(None)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MessageParams {
    message: Option<String>,
}

/// Returns an error.
struct Fail;

impl Operation for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Fail with `message`"
    }

    fn run(&self, parameters: &Parameters, _ctx: &TaskContext) -> Result<Option<Records>> {
        let params: MessageParams = parse(parameters)?;
        bail!(
            "{}",
            params.message.unwrap_or_else(|| "operation failed".into())
        )
    }
}

/// Panics.
struct Panic;

impl Operation for Panic {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Panic with `message`"
    }

    fn run(&self, parameters: &Parameters, _ctx: &TaskContext) -> Result<Option<Records>> {
        let params: MessageParams = parse(parameters)?;
        panic!(
            "{}",
            params.message.unwrap_or_else(|| "operation panicked".into())
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ExitParams {
    code: i32,
    lines: Vec<String>,
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            code: 3,
            lines: Vec::new(),
        }
    }
}

/// Exits the process without reporting a result.
struct Exit;

impl Operation for Exit {
    fn name(&self) -> &str {
        "exit"
    }

    fn description(&self) -> &str {
        "Write `lines`, then exit with `code` without reporting a result"
    }

    fn run(&self, parameters: &Parameters, ctx: &TaskContext) -> Result<Option<Records>> {
        let params: ExitParams = parse(parameters)?;
        let mut out = ctx.output();
        for line in &params.lines {
            writeln!(out, "{line}")?;
        }
        std::process::exit(params.code)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AmbientParams {
    stdout: Vec<String>,
    /// Redraws printed to stdout with a leading `\r` and no newline.
    stdout_progress: Vec<String>,
    stderr_progress: Vec<String>,
    rows: Option<Vec<Map<String, Value>>>,
}

/// Writes straight to the process's stdout and stderr, bypassing the
/// injected writer, the way third-party libraries do.
struct Ambient;

impl Operation for Ambient {
    fn name(&self) -> &str {
        "ambient"
    }

    fn description(&self) -> &str {
        "Print lines and redraws directly to the process streams, then return the given rows"
    }

    fn run(&self, parameters: &Parameters, _ctx: &TaskContext) -> Result<Option<Records>> {
        let params: AmbientParams = parse(parameters)?;
        for line in &params.stdout {
            println!("{line}");
        }
        let mut stdout = std::io::stdout();
        for step in &params.stdout_progress {
            write!(stdout, "\r{step}")?;
            stdout.flush()?;
            thread::sleep(Duration::from_millis(20));
        }
        let mut stderr = std::io::stderr();
        for step in &params.stderr_progress {
            write!(stderr, "\r{step}")?;
            stderr.flush()?;
            thread::sleep(Duration::from_millis(20));
        }
        if !params.stderr_progress.is_empty() {
            writeln!(stderr)?;
        }
        Ok(params.rows.map(Records::from_rows))
    }
}
