//! End-to-end lifecycle tests: start, poll and the four terminal outcomes,
//! driven against the crate's own binary in worker mode.

mod common;

use common::*;
use ostk_executor::TaskState;
use ostk_executor::error::ExecutorError;
use ostk_executor::executor::{TaskExecutor, TaskResult};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn poll_right_after_start_reports_running() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("emit"),
            params(json!({"lines": ["A"], "delay_ms": 300})),
        )
        .unwrap();

    let snapshot = executor.poll();
    assert_eq!(snapshot.state, TaskState::Running);
    assert!(snapshot.is_executing);
    assert!(!snapshot.complete);
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.status_message, "Connecting...");
    assert!(snapshot.started_at.is_some());

    poll_until_complete(&mut executor).await;
}

#[tokio::test]
async fn rows_produce_success_with_records() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("emit"),
            params(json!({
                "rows": [
                    {"icao24": "3c6444", "callsign": "DLH4AB"},
                    {"icao24": "4ca7b4", "callsign": "EIN2TK"}
                ]
            })),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Success);
    assert!(!snapshot.is_executing);
    assert!(snapshot.finished_at.is_some());
    match snapshot.result {
        Some(TaskResult::Success { row_count, ref columns }) => {
            assert_eq!(row_count, 2);
            assert!(columns.contains(&"callsign".to_string()));
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(has_log(&snapshot, "Retrieved 2 rows"));

    let records = executor.take_last_result().expect("records are kept");
    assert_eq!(records.row_count(), 2);
    assert!(executor.last_result().is_none());
}

#[tokio::test]
async fn log_lines_keep_emission_order() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("emit"),
            params(json!({"lines": ["line A", "line B", "line C"], "rows": []})),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    let a = log_position(&snapshot, "line A").expect("A logged");
    let b = log_position(&snapshot, "line B").expect("B logged");
    let c = log_position(&snapshot, "line C").expect("C logged");
    assert!(a < b && b < c, "{:?}", snapshot.recent_log_lines);
}

#[tokio::test]
async fn empty_or_missing_rows_are_no_data_not_failure() {
    for parameters in [json!({"rows": []}), json!({})] {
        let mut executor = TaskExecutor::new(test_config());
        executor
            .start(worker_spec("emit"), params(parameters))
            .unwrap();

        let snapshot = poll_until_complete(&mut executor).await;
        assert_eq!(snapshot.state, TaskState::NoData);
        let result = snapshot.result.unwrap();
        assert_eq!(result, TaskResult::no_data());
        assert_eq!(result.error(), None);
        assert!(executor.last_result().is_none());
    }
}

#[tokio::test]
async fn operation_error_becomes_failure() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("fail"),
            params(json!({"message": "HTTP 503 from coordinator"})),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Failure);
    let error = snapshot.result.unwrap().error().unwrap().to_string();
    assert!(error.contains("HTTP 503 from coordinator"), "{error}");
}

#[tokio::test]
async fn panicking_operation_becomes_failure() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("panic"), params(json!({"message": "kaboom"})))
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Failure);
    let error = snapshot.result.unwrap().error().unwrap().to_string();
    assert!(error.contains("operation panicked"), "{error}");
    assert!(error.contains("kaboom"), "{error}");
}

#[tokio::test]
async fn unknown_operation_becomes_failure() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("teleport"), Default::default())
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Failure);
    assert!(
        snapshot
            .result
            .unwrap()
            .error()
            .unwrap()
            .contains("unknown operation 'teleport'")
    );
}

#[tokio::test]
async fn start_while_running_is_rejected_and_leaves_task_alone() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("hang"), params(json!({"lines": ["busy"]})))
        .unwrap();

    let err = executor
        .start(worker_spec("emit"), Default::default())
        .unwrap_err();
    assert!(matches!(err, ExecutorError::AlreadyRunning));
    assert!(err.is_rejection());
    assert_eq!(executor.state(), TaskState::Running);

    executor.cancel().await.unwrap();
    assert_eq!(executor.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn finished_task_can_be_followed_by_a_new_one() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("emit"), params(json!({"lines": ["first"]})))
        .unwrap();
    poll_until_complete(&mut executor).await;

    executor
        .start(worker_spec("emit"), params(json!({"lines": ["second"]})))
        .unwrap();
    let snapshot = poll_until_complete(&mut executor).await;
    assert!(has_log(&snapshot, "second"));
    assert!(!has_log(&snapshot, "first"));
    assert_eq!(
        executor.parameters().unwrap()["lines"],
        json!(["second"])
    );
}

#[tokio::test]
async fn silent_death_is_reported_as_unexpected_termination() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("exit"),
            params(json!({"code": 3, "lines": ["about to vanish"]})),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Failure);
    let error = snapshot.result.as_ref().unwrap().error().unwrap().to_string();
    assert!(error.contains("terminated unexpectedly"), "{error}");
    assert!(has_log(&snapshot, "about to vanish"));
}

#[tokio::test]
async fn ambient_output_is_intercepted() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("ambient"),
            params(json!({
                "stdout": ["printed by a library"],
                "stderr_progress": ["10%", "55%", "100%"]
            })),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::NoData);
    assert!(has_log(&snapshot, "printed by a library"));
    // progress redraws update the status, they are not log lines
    assert!(!has_log(&snapshot, "55%"));
}

fn redraw_then_rows() -> ostk_executor::Parameters {
    params(json!({
        "stdout_progress": ["[##   ] 40%", "[#### ] 80%"],
        "rows": [{"icao24": "3c6444", "callsign": "DLH4AB"}]
    }))
}

#[tokio::test]
async fn stdout_redraw_does_not_swallow_the_result() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("ambient"), redraw_then_rows())
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Success, "{:?}", snapshot.result);
    assert!(matches!(
        snapshot.result,
        Some(TaskResult::Success { row_count: 1, .. })
    ));
    assert!(has_log(&snapshot, "Running ambient"));
    assert!(has_log(&snapshot, "Retrieved 1 rows"));
    assert!(!has_log(&snapshot, "80%"));
}

#[tokio::test]
async fn stdout_redraw_with_worker_logging_off() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("ambient").env("OSTK_WORKER_LOG", "off"),
            redraw_then_rows(),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.state, TaskState::Success, "{:?}", snapshot.result);
    assert_eq!(executor.last_result().map(|records| records.row_count()), Some(1));
    assert!(!has_log(&snapshot, "Retrieved 1 rows"));
}

#[tokio::test]
async fn progress_and_query_id_are_visible_while_running() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("emit"),
            params(json!({
                "progress": ["[##   ] 40%", "[#### ] 80%"],
                "query_id": "20240101_000000_00001_abcde",
                "delay_ms": 300,
                "rows": [{"icao24": "3c6444"}]
            })),
        )
        .unwrap();

    let mut statuses = Vec::new();
    let snapshot = poll_until(&mut executor, COMPLETION_TIMEOUT, |s| {
        statuses.push(s.status_message.clone());
        s.complete
    })
    .await;

    assert!(
        statuses.iter().any(|s| s.contains("80%")),
        "statuses seen: {statuses:?}"
    );
    assert_eq!(snapshot.state, TaskState::Success);
    assert_eq!(
        snapshot.query_id.as_deref(),
        Some("20240101_000000_00001_abcde")
    );
    assert!(has_log(&snapshot, "Query ID: 20240101_000000_00001_abcde"));
}

#[tokio::test]
async fn tracing_logs_are_forwarded() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(
            worker_spec("emit"),
            params(json!({"log": ["contacting coordinator"]})),
        )
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert!(has_log(&snapshot, "contacting coordinator"));
    assert!(snapshot.total_log_lines >= snapshot.recent_log_lines.len() as u64);
}

#[tokio::test]
async fn log_retention_is_bounded() {
    let mut config = test_config();
    config.executor.log_retention = 5;
    let lines: Vec<String> = (0..20).map(|i| format!("line {i:02}")).collect();

    let mut executor = TaskExecutor::new(config);
    executor
        .start(worker_spec("emit"), params(json!({"lines": lines})))
        .unwrap();

    let snapshot = poll_until_complete(&mut executor).await;
    assert_eq!(snapshot.recent_log_lines.len(), 5);
    assert!(snapshot.total_log_lines > 20);
    assert!(!has_log(&snapshot, "line 00"));
}

#[tokio::test]
async fn terminal_state_is_stable_across_polls() {
    let mut executor = TaskExecutor::new(test_config());
    executor
        .start(worker_spec("fail"), Default::default())
        .unwrap();
    let first = poll_until_complete(&mut executor).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = executor.poll();
    assert_eq!(first.state, second.state);
    assert_eq!(first.result, second.result);
}
