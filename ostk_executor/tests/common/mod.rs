//! Shared helpers for integration tests that drive the real worker binary.
#![allow(dead_code)]

use async_trait::async_trait;
use ostk_executor::Parameters;
use ostk_executor::config::ExecutorConfig;
use ostk_executor::executor::{OperationSpec, Snapshot, TaskExecutor};
use ostk_executor::remote::{QueryCanceller, RemoteCancelOutcome};
use std::sync::Mutex;
use std::time::Duration;

/// Upper bound for anything that should finish "soon"; generous for CI.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(20);
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spec that launches this crate's binary in worker mode.
pub fn worker_spec(operation: &str) -> OperationSpec {
    OperationSpec::new(env!("CARGO_BIN_EXE_ostk_executor"), operation).arg("worker")
}

pub fn params(value: serde_json::Value) -> Parameters {
    value
        .as_object()
        .cloned()
        .expect("parameters must be a JSON object")
}

/// Config with short grace periods and remote cancellation disabled.
pub fn test_config() -> ExecutorConfig {
    let mut config = ExecutorConfig::default();
    config.executor.termination_grace_ms = 2000;
    config.executor.exit_drain_grace_ms = 200;
    config.remote_cancel.enabled = false;
    config
}

/// Poll until `condition` holds for a snapshot, or the timeout expires.
/// Returns the last snapshot either way.
pub async fn poll_until<F>(executor: &mut TaskExecutor, timeout: Duration, mut condition: F) -> Snapshot
where
    F: FnMut(&Snapshot) -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        let snapshot = executor.poll();
        if condition(&snapshot) || start.elapsed() >= timeout {
            return snapshot;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn poll_until_complete(executor: &mut TaskExecutor) -> Snapshot {
    let snapshot = poll_until(executor, COMPLETION_TIMEOUT, |s| s.complete).await;
    assert!(snapshot.complete, "task did not finish in time: {snapshot:?}");
    snapshot
}

pub fn log_position(snapshot: &Snapshot, needle: &str) -> Option<usize> {
    snapshot
        .recent_log_lines
        .iter()
        .position(|line| line.contains(needle))
}

pub fn has_log(snapshot: &Snapshot, needle: &str) -> bool {
    log_position(snapshot, needle).is_some()
}

/// Canceller that records the ids it was asked to cancel.
pub struct RecordingCanceller {
    outcome: RemoteCancelOutcome,
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl RecordingCanceller {
    pub fn new(outcome: RemoteCancelOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryCanceller for RecordingCanceller {
    async fn cancel_query(&self, query_id: &str) -> RemoteCancelOutcome {
        self.seen.lock().unwrap().push(query_id.to_string());
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }
}
