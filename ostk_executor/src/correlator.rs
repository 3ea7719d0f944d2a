//! Remote query correlation.
//!
//! A remote engine assigns an identifier to a query as soon as it starts
//! executing. Cancelling the query server-side needs that identifier, but it
//! only ever shows up inside the responses an operation processes. The
//! [`QueryIdCorrelator`] sits in front of that processing step, captures the
//! identifier the first time it appears and hands it to a callback.

use std::sync::OnceLock;

/// A response that may carry the remote query identifier.
pub trait RemoteResponse {
    fn query_id(&self) -> Option<&str>;
}

impl<T: RemoteResponse + ?Sized> RemoteResponse for &T {
    fn query_id(&self) -> Option<&str> {
        (**self).query_id()
    }
}

type CaptureCallback = Box<dyn Fn(&str) + Send + Sync>;

/// One-shot capture of the remote query identifier.
pub struct QueryIdCorrelator {
    captured: OnceLock<String>,
    on_capture: CaptureCallback,
}

impl QueryIdCorrelator {
    /// `on_capture` runs synchronously, at most once, with the first identifier seen.
    pub fn new(on_capture: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            captured: OnceLock::new(),
            on_capture: Box::new(on_capture),
        }
    }

    /// Inspect a response. Returns `true` only for the call that captured the id.
    pub fn observe<R: RemoteResponse + ?Sized>(&self, response: &R) -> bool {
        let Some(id) = response.query_id().filter(|id| !id.trim().is_empty()) else {
            return false;
        };
        if self.captured.set(id.to_string()).is_err() {
            return false;
        }
        tracing::debug!("Captured remote query id {}", id);
        (self.on_capture)(id);
        true
    }

    pub fn captured(&self) -> Option<&str> {
        self.captured.get().map(String::as_str)
    }

    /// Decorate a response-processing step so every response passes through
    /// [`observe`](Self::observe) before `process` sees it.
    pub fn wrap<'a, R, T, F>(&'a self, mut process: F) -> impl FnMut(R) -> T + 'a
    where
        R: RemoteResponse,
        F: FnMut(R) -> T + 'a,
    {
        move |response| {
            self.observe(&response);
            process(response)
        }
    }
}

impl std::fmt::Debug for QueryIdCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryIdCorrelator")
            .field("captured", &self.captured.get())
            .finish_non_exhaustive()
    }
}
