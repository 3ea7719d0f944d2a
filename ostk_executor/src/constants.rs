//! Defaults and user-visible status strings.

use std::time::Duration;

/// Number of log lines kept per task.
pub const DEFAULT_LOG_RETENTION: usize = 30;

/// Maximum length of a progress string shown as the status message.
pub const DEFAULT_STATUS_MAX_CHARS: usize = 80;

/// How long a worker gets to exit after being told to terminate.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// How long after the child exits we keep waiting for its pipes to drain.
pub const DEFAULT_EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_REMOTE_CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_REMOTE_CANCEL_ENDPOINT: &str = "https://trino.opensky-network.org/v1/query/";

pub const DEFAULT_REMOTE_USER: &str = "pyopensky";

pub const DEFAULT_TOKEN_ENV: &str = "OSTK_TRINO_TOKEN";

/// Exit code of a worker that honoured a terminate request.
pub const TERMINATED_EXIT_CODE: i32 = 143;

pub mod status {
    pub const CONNECTING: &str = "Connecting...";
    pub const FETCHING: &str = "Fetching data...";
    pub const SAVING: &str = "Saving results to cache...";
    pub const PROCESSING: &str = "Processing results...";
    pub const CANCELLING: &str = "Cancelling...";
    pub const CANCELLED: &str = "Cancelled";
    pub const NO_DATA: &str = "No data found";
}

pub mod messages {
    pub const CANCEL_REQUESTED: &str = "Cancellation requested...";
    pub const QUERY_CANCELLED: &str = "Query cancelled";
    pub const PROCESS_TERMINATED: &str = "Query process terminated";
    pub const NO_QUERY_ID: &str = "No query ID captured yet, skipping remote cancellation";
    pub const NO_CANCELLER: &str = "No remote cancellation client configured";
    pub const UNEXPECTED_TERMINATION: &str = "execution context terminated unexpectedly";
}
