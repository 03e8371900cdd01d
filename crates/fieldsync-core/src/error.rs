//! Error types for the upload pipeline.
//!
//! Two categories exist: programmer errors (`UploadError::InvalidArgument`)
//! which fail fast and are never retried, and transient I/O failures which
//! are logged once at the call site and recovered by the retry machinery.

use std::future::Future;
use std::time::Duration;

/// Errors surfaced by the uploader's public API.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Empty id or path passed to an enqueue call. Signals a caller bug.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A `wait_for_idle` call timed out before the pipeline drained. The
    /// pipeline itself keeps running; only the waiting caller is affected.
    #[error("Timed out after {0:?} waiting for the upload pipeline to go idle")]
    IdleTimeout(Duration),
}

/// Error wrapper carrying an "already logged" marker.
///
/// Transient failures are logged exactly once, at the call site that observed
/// them. Layers above check [`LoggedError::is_logged`] before logging, so an
/// error propagating through the event pump does not produce duplicate lines.
#[derive(Debug, thiserror::Error)]
#[error("{context}: {source}")]
pub struct LoggedError {
    context: String,
    logged: bool,
    #[source]
    source: anyhow::Error,
}

impl LoggedError {
    /// Logs `source` with identifying context and wraps it with the marker set.
    pub fn log(context: impl Into<String>, source: anyhow::Error) -> Self {
        let context = context.into();
        tracing::error!(
            context = %context,
            error = %source,
            "Upload pipeline operation failed"
        );
        Self {
            context,
            logged: true,
            source,
        }
    }

    pub fn is_logged(&self) -> bool {
        self.logged
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Runs `call`, logging any error with `context` and marking it as logged.
/// An error that already carries the marker passes through untouched.
pub async fn log_if_error<T, F>(context: &str, call: F) -> Result<T, LoggedError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match call.await {
        Ok(value) => Ok(value),
        Err(err) => match err.downcast::<LoggedError>() {
            Ok(already_logged) => Err(already_logged),
            Err(err) => Err(LoggedError::log(context, err)),
        },
    }
}
