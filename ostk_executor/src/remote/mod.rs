//! Best-effort cancellation of a query that is already running server-side.
//!
//! Killing the local worker does not stop work the remote engine has already
//! accepted. Once the query id is known the executor asks the engine to drop
//! the query through a [`QueryCanceller`]; whatever the answer, local
//! termination proceeds.

mod client;
mod token;

pub use client::TrinoCancelClient;
pub use token::{EnvToken, StaticToken, TokenProvider};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteCancelError {
    #[error("no access token available")]
    MissingToken,
    #[error("invalid cancellation endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("URL parsing failed: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// What the remote service said about a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemoteCancelOutcome {
    /// Cancelled, or already gone.
    Confirmed { status: u16 },
    /// The service answered but refused.
    Rejected { status: u16 },
    /// No answer: missing credentials, transport error or timeout.
    Unknown { reason: String },
}

impl RemoteCancelOutcome {
    /// Map an HTTP status to an outcome. 404 and 410 mean the query no longer exists.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 | 204 | 404 | 410 => RemoteCancelOutcome::Confirmed { status },
            _ => RemoteCancelOutcome::Rejected { status },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteCancelOutcome::Confirmed { .. })
    }
}

impl From<RemoteCancelError> for RemoteCancelOutcome {
    fn from(err: RemoteCancelError) -> Self {
        RemoteCancelOutcome::Unknown {
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for RemoteCancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCancelOutcome::Confirmed { status } => {
                write!(f, "Remote query cancelled (HTTP {status})")
            }
            RemoteCancelOutcome::Rejected { status } => {
                write!(f, "Failed to cancel remote query (HTTP {status})")
            }
            RemoteCancelOutcome::Unknown { reason } => {
                write!(f, "Failed to cancel remote query: {reason}")
            }
        }
    }
}

/// Something that can ask a remote engine to drop a query.
#[async_trait]
pub trait QueryCanceller: Send + Sync {
    /// Must return within its own bounded timeout and never panic.
    async fn cancel_query(&self, query_id: &str) -> RemoteCancelOutcome;
}
