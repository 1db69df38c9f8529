//! Structured errors for the worker adapter.
//!
//! Every failure is reported back to the host as an `error` reply carrying the
//! same codes the core error renders with.

use serde::Serialize;

/// Errors raised while handling a single event.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The event line was not valid JSON or named an unknown event.
    #[error("INVALID_INPUT: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Worker(#[from] shellcache_core::Error),
}

impl AdapterError {
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::InvalidEvent(_) => "INVALID_INPUT",
            AdapterError::Worker(e) => e.code(),
        }
    }
}

/// Error body written to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub code: &'static str,
    pub message: String,
}

impl From<&AdapterError> for ErrorReply {
    fn from(err: &AdapterError) -> Self {
        ErrorReply { code: err.code(), message: err.to_string() }
    }
}
