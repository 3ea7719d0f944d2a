//! # OSTK Isolated Task Executor
//!
//! Runs a slow, possibly hanging data-retrieval operation in a separate OS
//! process and keeps the caller responsive while it runs.
//!
//! ## Core Components
//!
//! - **[`executor::TaskExecutor`]**: owns one task at a time and exposes the
//!   non-blocking `start` / `poll` / `cancel` surface.
//! - **[`interceptor`]**: turns ambient text output (including carriage-return
//!   progress redraws) into discrete log and progress events.
//! - **[`correlator`]**: captures the remote query identifier the first time a
//!   response carries one.
//! - **[`remote`]**: best-effort cancellation of the remote query over HTTP.
//! - **[`worker`]**: the child-side runtime that runs an operation and reports
//!   back over the line protocol defined in `ostk_common`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ostk_executor::executor::{OperationSpec, TaskExecutor};
//! use ostk_executor::config::ExecutorConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut executor = TaskExecutor::new(ExecutorConfig::default());
//! executor.start(OperationSpec::current_exe("emit")?, Default::default())?;
//! loop {
//!     let snapshot = executor.poll();
//!     if snapshot.complete {
//!         break;
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod correlator;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod log_buffer;
pub mod remote;
pub mod shell;
pub mod utils;
pub mod worker;

pub use ostk_common::{ControlMessage, Event, Parameters, Records, TaskRequest, TaskState};
