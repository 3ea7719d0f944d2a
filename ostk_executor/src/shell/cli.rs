//! # OSTK Executor CLI
//!
//! Command-line interface definition and dispatch.

use crate::config::{ExecutorConfig, load_config};
use crate::executor::{OperationSpec, Snapshot, TaskExecutor};
use crate::remote::{QueryCanceller, TrinoCancelClient};
use crate::utils::logging::init_logging;
use crate::utils::time::{clock_prefix, format_elapsed};
use crate::worker::{builtin, run_worker};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use ostk_common::{Parameters, TaskState};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

/// Run slow data-retrieval operations in an isolated process you can always cancel.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "ostk_executor runs an operation in a child process, streams its logs and progress,
and cancels it on Ctrl-C or timeout (remote query first, then the process).

Examples:
  ostk_executor run emit --params '{\"lines\": [\"hello\"], \"rows\": [{\"a\": 1}]}'
  ostk_executor run hang --params '{\"query_id\": \"q-1\"}' --timeout-secs 5
  ostk_executor run script --program ./fetch.sh
  ostk_executor cancel-remote 20240101_120000_00042_abcde"
)]
pub struct Cli {
    /// Path to a TOML config file (defaults to the per-user config, if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of the rolling log file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run an operation and follow it until it finishes
    Run(RunArgs),

    /// Ask the remote engine to cancel a query by id
    CancelRemote {
        /// Remote query identifier
        query_id: String,
    },

    /// List the built-in operations
    Operations,

    /// Worker protocol entry point (used by the executor itself)
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Operation name passed to the worker
    pub operation: String,

    /// Operation parameters as a JSON object
    #[arg(long, conflicts_with = "params_file")]
    pub params: Option<String>,

    /// File containing the operation parameters as a JSON object
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Program to launch instead of the built-in worker
    #[arg(long)]
    pub program: Option<PathBuf>,

    /// Argument for --program (repeatable)
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    pub program_args: Vec<String>,

    /// Cancel the operation after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Parameters from `--params` or `--params-file`; empty when neither is given.
    pub fn parameters(&self) -> Result<Parameters> {
        let raw = match (&self.params, &self.params_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, None) => return Ok(Parameters::new()),
        };
        match serde_json::from_str(&raw).context("Parameters are not valid JSON")? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(anyhow!("Parameters must be a JSON object, got {other}")),
        }
    }

    pub fn operation_spec(&self) -> Result<OperationSpec> {
        match &self.program {
            Some(program) => Ok(OperationSpec::new(program, &self.operation)
                .args(self.program_args.iter().cloned())),
            None => OperationSpec::current_exe(&self.operation)
                .context("Failed to locate the current executable"),
        }
    }
}

/// Main entry point for the `ostk_executor` binary.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Command::Worker) {
        return tokio::task::spawn_blocking(|| run_worker(&builtin::registry()))
            .await
            .context("Worker thread failed")?;
    }

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr);
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Command::Run(args) => run_operation(args, config).await,
        Command::CancelRemote { query_id } => cancel_remote(&query_id, &config).await,
        Command::Operations => {
            for operation in builtin::registry().iter() {
                println!("{:<10} {}", operation.name(), operation.description());
            }
            Ok(())
        }
        Command::Worker => unreachable!("handled above"),
    }
}

async fn run_operation(args: RunArgs, config: ExecutorConfig) -> Result<()> {
    let parameters = args.parameters()?;
    let spec = args.operation_spec()?;
    let interval = config.executor.poll_interval();
    let deadline = args
        .timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut executor = TaskExecutor::from_config(config);
    executor.start(spec, parameters)?;
    let started = Instant::now();

    let mut printer = ProgressPrinter::default();
    let mut cancelling = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let snapshot = loop {
        let snapshot = executor.poll();
        for line in printer.render(&snapshot, SystemTime::now()) {
            println!("{line}");
        }
        if snapshot.complete {
            break snapshot;
        }

        if !cancelling && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            println!("Timed out after {}, cancelling...", format_elapsed(started.elapsed()));
            cancelling = true;
            if let Err(err) = executor.cancel().await {
                tracing::debug!("Cancel after timeout: {}", err);
            }
            continue;
        }

        tokio::select! {
            _ = &mut ctrl_c, if !cancelling => {
                println!("Interrupted, cancelling...");
                cancelling = true;
                if let Err(err) = executor.cancel().await {
                    tracing::debug!("Cancel after interrupt: {}", err);
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    let summary = snapshot
        .result
        .as_ref()
        .map(|result| result.describe())
        .unwrap_or_default();
    println!("{} ({})", summary, format_elapsed(started.elapsed()));

    match snapshot.state {
        TaskState::Success | TaskState::NoData => Ok(()),
        state => bail!("operation '{}' ended as {}", args.operation, state),
    }
}

async fn cancel_remote(query_id: &str, config: &ExecutorConfig) -> Result<()> {
    let client = TrinoCancelClient::from_config(&config.remote_cancel)
        .context("Failed to build cancellation client")?;
    let outcome = client.cancel_query(query_id).await;
    println!("{outcome}");
    if outcome.is_success() {
        Ok(())
    } else {
        bail!("remote cancellation of {query_id} did not succeed")
    }
}

/// Turns successive snapshots into console lines: new log lines and status changes.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    seen_lines: u64,
    last_status: String,
}

impl ProgressPrinter {
    pub fn render(&mut self, snapshot: &Snapshot, now: SystemTime) -> Vec<String> {
        let mut out = Vec::new();

        let new_lines = snapshot.total_log_lines.saturating_sub(self.seen_lines) as usize;
        let skip = snapshot.recent_log_lines.len().saturating_sub(new_lines);
        for line in &snapshot.recent_log_lines[skip..] {
            out.push(format!("  {line}"));
        }
        self.seen_lines = snapshot.total_log_lines;

        if !snapshot.status_message.is_empty() && snapshot.status_message != self.last_status {
            out.push(format!("{} {}", clock_prefix(now), snapshot.status_message));
            self.last_status = snapshot.status_message.clone();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_run_with_inline_params() {
        let args = run_args(&[
            "ostk_executor",
            "run",
            "emit",
            "--params",
            r#"{"lines": ["a"]}"#,
            "--timeout-secs",
            "5",
        ]);
        assert_eq!(args.operation, "emit");
        assert_eq!(args.timeout_secs, Some(5));
        assert_eq!(args.parameters().unwrap()["lines"], serde_json::json!(["a"]));
    }

    #[test]
    fn params_must_be_an_object() {
        let args = run_args(&["ostk_executor", "run", "emit", "--params", "[1, 2]"]);
        assert!(args.parameters().is_err());
    }

    #[test]
    fn params_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"seconds": 1}"#).unwrap();
        let args = run_args(&[
            "ostk_executor",
            "run",
            "sleep",
            "--params-file",
            path.to_str().unwrap(),
        ]);
        assert_eq!(args.parameters().unwrap()["seconds"], serde_json::json!(1));
    }

    #[test]
    fn external_program_spec() {
        let args = run_args(&[
            "ostk_executor",
            "run",
            "script",
            "--program",
            "/usr/bin/env",
            "--program-arg",
            "-i",
            "--program-arg",
            "true",
        ]);
        let spec = args.operation_spec().unwrap();
        assert_eq!(spec.program(), std::path::Path::new("/usr/bin/env"));
        assert_eq!(spec.program_args().len(), 2);
        assert_eq!(spec.operation(), "script");
    }

    #[test]
    fn worker_subcommand_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["ostk_executor", "worker"]).unwrap();
        assert!(matches!(cli.command, Command::Worker));
    }

    #[test]
    fn printer_emits_only_new_lines_and_status_changes() {
        let mut printer = ProgressPrinter::default();
        let now = SystemTime::now();
        let mut snapshot = Snapshot::idle();
        snapshot.status_message = "Connecting...".into();
        snapshot.recent_log_lines = vec!["a".into(), "b".into()];
        snapshot.total_log_lines = 2;

        let first = printer.render(&snapshot, now);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], "  a");
        assert!(first[2].ends_with("Connecting..."));

        snapshot.recent_log_lines = vec!["b".into(), "c".into()];
        snapshot.total_log_lines = 3;
        assert_eq!(printer.render(&snapshot, now), vec!["  c".to_string()]);
        assert!(printer.render(&snapshot, now).is_empty());
    }
}
